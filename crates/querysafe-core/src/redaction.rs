use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection metadata with secrets redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedConnection {
    pub engine: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub redacted: String,
}

impl fmt::Display for RedactedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

/// Redact secrets from a connection URL while extracting non-sensitive metadata.
///
/// Passwords in the authority section and sensitive query parameters are
/// replaced by `***`. Strings without a `scheme://` prefix are returned
/// unchanged apart from query parameter redaction.
pub fn redact_connection_string(conn: &str) -> RedactedConnection {
    let mut out = RedactedConnection {
        engine: None,
        user: None,
        host: None,
        port: None,
        database: None,
        redacted: conn.to_string(),
    };

    if let Some(scheme_end) = conn.find("://") {
        out.engine = Some(conn[..scheme_end].to_string());
        let rest_start = scheme_end + 3;
        let rest = &conn[rest_start..];
        let location_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let location = &rest[..location_end];

        let host_port = match location.rfind('@') {
            Some(at_idx) => {
                let auth = &location[..at_idx];
                match auth.split_once(':') {
                    Some((user, password)) => {
                        out.user = Some(user.to_string());
                        let start = rest_start + user.len() + 1;
                        out.redacted
                            .replace_range(start..start + password.len(), "***");
                    }
                    None => out.user = Some(auth.to_string()),
                }
                &location[at_idx + 1..]
            }
            None => location,
        };

        if !host_port.is_empty() {
            match host_port.rsplit_once(':') {
                Some((host, port)) => {
                    out.host = Some(host.to_string());
                    out.port = port.parse().ok();
                }
                None => out.host = Some(host_port.to_string()),
            }
        }

        let path = rest[location_end..].trim_start_matches('/');
        let database = path.split('?').next().unwrap_or("");
        if !database.is_empty() {
            out.database = Some(database.to_string());
        }
    }

    out.redacted = redact_query_params(&out.redacted);
    out
}

fn redact_query_params(conn: &str) -> String {
    let Some((base, query)) = conn.split_once('?') else {
        return conn.to_string();
    };

    let params: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive_key(key) => format!("{key}=***"),
            _ => pair.to_string(),
        })
        .collect();

    format!("{base}?{}", params.join("&"))
}

fn is_sensitive_key(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "password" | "pass" | "pwd" | "token" | "api_key" | "apikey" | "sslpassword"
    )
}
