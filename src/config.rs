use anyhow::Context;
use dotenvy::dotenv;
use ipnet::IpNet;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub cookie_secure: bool,
    /// Proxies in front of us that append to `X-Forwarded-For`.
    pub trusted_proxy_depth: usize,
    pub public_base_url: String,
    pub vnpay: VnpayConfig,
    pub rate_limit: RateLimitConfig,
    pub product_cache_ttl_secs: u64,
    pub low_stock_threshold: i32,
    pub export_require_admin: bool,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub payment_url: String,
    pub return_url: String,
    pub ipn_allowed_ips: AllowedIps,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub enum AllowedIps {
    Any,
    Cidrs(Vec<IpNet>),
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let public_base_url =
            env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let config = Config {
            server_port: env_or("SERVER_PORT", "3000").parse()?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_ttl_hours: env_or("JWT_TTL_HOURS", "168").parse()?,
            cookie_secure: env_or("COOKIE_SECURE", "false").parse()?,
            trusted_proxy_depth: env_or("TRUSTED_PROXY_DEPTH", "0").parse()?,
            vnpay: VnpayConfig {
                tmn_code: env::var("VNPAY_TMN_CODE").context("VNPAY_TMN_CODE must be set")?,
                hash_secret: env::var("VNPAY_HASH_SECRET")
                    .context("VNPAY_HASH_SECRET must be set")?,
                payment_url: env_or(
                    "VNPAY_PAYMENT_URL",
                    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
                ),
                return_url: env::var("VNPAY_RETURN_URL")
                    .unwrap_or_else(|_| format!("{}/payment/result", public_base_url)),
                ipn_allowed_ips: parse_allowed_ips(&env_or("VNPAY_IPN_ALLOWED_IPS", "*"))?,
            },
            public_base_url,
            rate_limit: RateLimitConfig {
                max_attempts: env_or("RATE_LIMIT_MAX_ATTEMPTS", "5").parse()?,
                window_secs: env_or("RATE_LIMIT_WINDOW_SECS", "900").parse()?,
            },
            product_cache_ttl_secs: env_or("PRODUCT_CACHE_TTL_SECS", "60").parse()?,
            low_stock_threshold: env_or("LOW_STOCK_THRESHOLD", "10").parse()?,
            export_require_admin: env_or("EXPORT_REQUIRE_ADMIN", "true").parse()?,
            mail: MailConfig {
                api_url: env::var("MAIL_API_URL").ok().filter(|v| !v.trim().is_empty()),
                api_key: env::var("MAIL_API_KEY").ok(),
                from: env_or("MAIL_FROM", "no-reply@freshcut.local"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.jwt_secret.len() < 16 {
            anyhow::bail!("JWT_SECRET must be at least 16 characters");
        }
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.vnpay.tmn_code.is_empty() || self.vnpay.hash_secret.is_empty() {
            anyhow::bail!("VNPAY_TMN_CODE and VNPAY_HASH_SECRET must not be empty");
        }
        if self.rate_limit.max_attempts == 0 || self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate limit attempts and window must be greater than 0");
        }

        url::Url::parse(&self.public_base_url).context("PUBLIC_BASE_URL is not a valid URL")?;
        url::Url::parse(&self.vnpay.payment_url).context("VNPAY_PAYMENT_URL is not a valid URL")?;
        url::Url::parse(&self.vnpay.return_url).context("VNPAY_RETURN_URL is not a valid URL")?;
        if let Some(api_url) = &self.mail.api_url {
            url::Url::parse(api_url).context("MAIL_API_URL is not a valid URL")?;
        }

        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn parse_allowed_ips(raw: &str) -> anyhow::Result<AllowedIps> {
    let value = raw.trim();
    if value == "*" {
        return Ok(AllowedIps::Any);
    }

    let cidrs = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<std::net::IpAddr>().map(IpNet::from))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if cidrs.is_empty() {
        anyhow::bail!("VNPAY_IPN_ALLOWED_IPS must be '*' or a comma-separated list of CIDRs");
    }

    Ok(AllowedIps::Cidrs(cidrs))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server_port: 3000,
        database_url: "postgres://localhost:5432/freshcut".to_string(),
        jwt_secret: "test-secret-0123456789".to_string(),
        jwt_ttl_hours: 24,
        cookie_secure: false,
        trusted_proxy_depth: 0,
        public_base_url: "http://localhost:3000".to_string(),
        vnpay: VnpayConfig {
            tmn_code: "TESTCODE".to_string(),
            hash_secret: "SECRETKEY".to_string(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "http://localhost:3000/payment/result".to_string(),
            ipn_allowed_ips: AllowedIps::Any,
        },
        rate_limit: RateLimitConfig {
            max_attempts: 5,
            window_secs: 900,
        },
        product_cache_ttl_secs: 60,
        low_stock_threshold: 10,
        export_require_admin: true,
        mail: MailConfig {
            api_url: None,
            api_key: None,
            from: "no-reply@freshcut.local".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_any_ip() {
        assert!(matches!(parse_allowed_ips("*").unwrap(), AllowedIps::Any));
    }

    #[test]
    fn parses_cidrs_and_bare_addresses() {
        let parsed = parse_allowed_ips("113.160.92.0/24, 203.171.19.146").unwrap();
        match parsed {
            AllowedIps::Cidrs(cidrs) => assert_eq!(cidrs.len(), 2),
            AllowedIps::Any => panic!("expected cidr list"),
        }
    }

    #[test]
    fn rejects_garbage_allow_list() {
        assert!(parse_allowed_ips("not-an-ip").is_err());
        assert!(parse_allowed_ips(" , ").is_err());
    }

    #[test]
    fn validate_rejects_short_jwt_secret() {
        let mut config = test_config();
        config.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_return_url() {
        let mut config = test_config();
        config.vnpay.return_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }
}
