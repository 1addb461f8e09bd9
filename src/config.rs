use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppError;
use crate::notify::{
    HttpPushGateway, NoopNotifier, NoopPushGateway, Notifier, PushGateway, WebhookNotifier,
};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub closure_sweep_secs: u64,
    pub notify_webhook_url: Option<String>,
    pub push_api_url: Option<String>,
    pub push_api_token: Option<String>,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://attendance.db?mode=rwc".to_string());

        let bind_addr = parse_var("BIND_ADDR", "127.0.0.1:3000")?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", "5")?;
        let closure_sweep_secs = parse_var("CLOSURE_SWEEP_SECS", "30")?;

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            closure_sweep_secs,
            notify_webhook_url: optional_var("NOTIFY_WEBHOOK_URL"),
            push_api_url: optional_var("PUSH_API_URL"),
            push_api_token: optional_var("PUSH_API_TOKEN"),
        })
    }

    pub fn notifier(&self) -> Result<Arc<dyn Notifier>, AppError> {
        match &self.notify_webhook_url {
            Some(url) => {
                info!("notifications relayed to {}", url);
                Ok(Arc::new(WebhookNotifier::new(url.clone())?))
            }
            None => {
                warn!("NOTIFY_WEBHOOK_URL is not set, lecture events will not be broadcast");
                Ok(Arc::new(NoopNotifier))
            }
        }
    }

    pub fn push_gateway(&self) -> Result<Arc<dyn PushGateway>, AppError> {
        match (&self.push_api_url, &self.push_api_token) {
            (Some(url), Some(token)) => Ok(Arc::new(HttpPushGateway::new(url.clone(), token.clone())?)),
            (Some(_), None) => Err(AppError::BadRequest("PUSH_API_TOKEN is not set".to_string())),
            _ => {
                warn!("PUSH_API_URL is not set, push notifications are disabled");
                Ok(Arc::new(NoopPushGateway))
            }
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid {} value {:?}: {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default_and_invalid() {
        let port: u64 = parse_var("ATTENDANCE_TEST_UNSET_VAR", "30").unwrap();
        assert_eq!(port, 30);

        let bad: Result<u32, _> = parse_var("ATTENDANCE_TEST_UNSET_VAR", "thirty");
        assert!(matches!(bad, Err(AppError::BadRequest(_))));
    }
}
