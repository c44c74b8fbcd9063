use std::env;

use secrecy::ExposeSecret;
use segmint_core::config::{AppConfig, LoadOptions};

/// Renders the effective configuration with secrets redacted and a source
/// hint per field (env override wins over file/default).
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url, "SEGMINT_DATABASE_URL"));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        "SEGMINT_DATABASE_MAX_CONNECTIONS",
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        "SEGMINT_DATABASE_TIMEOUT_SECS",
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        "SEGMINT_SERVER_BIND_ADDRESS",
    ));
    lines.push(render_line("server.port", &config.server.port.to_string(), "SEGMINT_SERVER_PORT"));

    lines.push(render_line(
        "auth.token_secret",
        &redact(config.auth.token_secret.expose_secret()),
        "SEGMINT_AUTH_TOKEN_SECRET",
    ));
    lines.push(render_line(
        "auth.token_ttl_secs",
        &config.auth.token_ttl_secs.to_string(),
        "SEGMINT_AUTH_TOKEN_TTL_SECS",
    ));
    lines.push(render_line(
        "auth.bootstrap_admin",
        &config.auth.bootstrap_admin.to_string(),
        "SEGMINT_AUTH_BOOTSTRAP_ADMIN",
    ));

    lines.push(render_line(
        "gateway.enabled",
        &config.gateway.enabled.to_string(),
        "SEGMINT_GATEWAY_ENABLED",
    ));
    lines.push(render_line("gateway.base_url", &config.gateway.base_url, "SEGMINT_GATEWAY_BASE_URL"));
    let secret_key = config
        .gateway
        .secret_key
        .as_ref()
        .map(|key| redact(key.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line("gateway.secret_key", &secret_key, "SEGMINT_GATEWAY_SECRET_KEY"));
    let webhook_secret = config
        .gateway
        .webhook_secret
        .as_deref()
        .map(redact)
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line(
        "gateway.webhook_secret",
        &webhook_secret,
        "SEGMINT_GATEWAY_WEBHOOK_SECRET",
    ));
    lines.push(render_line("gateway.currency", &config.gateway.currency, "SEGMINT_GATEWAY_CURRENCY"));

    lines.push(render_line("logging.level", &config.logging.level, "SEGMINT_LOGGING_LEVEL"));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        "SEGMINT_LOGGING_FORMAT",
    ));

    lines.join("\n")
}

fn render_line(field: &str, value: &str, env_key: &str) -> String {
    let source = if env_is_set(env_key) { "env" } else { "file/default" };
    format!("  {field} = {value}  [{source}]")
}

fn env_is_set(key: &str) -> bool {
    env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false)
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    if secret.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &secret[..4])
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn redaction_keeps_only_a_short_prefix() {
        assert_eq!(redact(""), "(unset)");
        assert_eq!(redact("abc"), "****");
        assert_eq!(redact("sk_test_abcdef"), "sk_t****");
    }
}
