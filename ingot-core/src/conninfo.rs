//! Connection descriptor parsing
//!
//! A running database instance exposes its address as a conninfo string:
//! space-separated `key=value` pairs where a value may be single-quoted
//! (`password='z z'`) with `\'` and `\\` escapes. This module parses that
//! grammar into a typed [`ConnInfo`] and renders it back without loss.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Result type alias for descriptor operations
pub type Result<T> = std::result::Result<T, ConnInfoError>;

/// Errors that can occur while resolving a connection descriptor
#[derive(Debug, Error)]
pub enum ConnInfoError {
    /// A pair had no `=` separator
    #[error("malformed conninfo pair `{0}`: expected key=value")]
    MalformedPair(String),

    /// A single-quoted value was never closed
    #[error("unterminated quoted value for key `{0}`")]
    UnterminatedQuote(String),

    /// The descriptor named no host
    #[error("connection descriptor has no `host` key")]
    MissingHost,

    /// The descriptor named no port
    #[error("connection descriptor has no `port` key")]
    MissingPort,

    /// The `port` value does not parse as a port number.
    ///
    /// Descriptors are emitted by the instance controller, so a malformed
    /// port is an internal invariant violation rather than a user error.
    #[error("internal: descriptor port `{0}` is not a valid port number")]
    InvalidPort(String),
}

/// A parsed connection descriptor
///
/// `host` and `port` are required; the remaining well-known keys are kept
/// when present and everything else lands in `extra` in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnInfo {
    pub host: String,
    pub port: u16,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Keys beyond the well-known ones (`sslmode`, ...)
    pub extra: BTreeMap<String, String>,
}

impl ConnInfo {
    /// Parses a conninfo string into its typed form
    pub fn parse(input: &str) -> Result<Self> {
        let mut host = None;
        let mut port_raw: Option<String> = None;
        let mut dbname = None;
        let mut user = None;
        let mut password = None;
        let mut extra = BTreeMap::new();

        for (key, value) in scan_pairs(input)? {
            match key.as_str() {
                "host" => host = Some(value),
                "port" => port_raw = Some(value),
                "dbname" => dbname = Some(value),
                "user" => user = Some(value),
                "password" => password = Some(value),
                _ => {
                    extra.insert(key, value);
                }
            }
        }

        let host = host.ok_or(ConnInfoError::MissingHost)?;
        let port_raw = port_raw.ok_or(ConnInfoError::MissingPort)?;
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| ConnInfoError::InvalidPort(port_raw))?;

        Ok(Self {
            host,
            port,
            dbname,
            user,
            password,
            extra,
        })
    }

    /// Renders a `postgres://` URL for driver libraries that expect one
    pub fn url(&self) -> String {
        let mut url = String::from("postgres://");
        if let Some(user) = &self.user {
            url.push_str(user);
            if let Some(password) = &self.password {
                url.push(':');
                url.push_str(password);
            }
            url.push('@');
        }
        url.push_str(&self.host);
        url.push(':');
        url.push_str(&self.port.to_string());
        url.push('/');
        if let Some(dbname) = &self.dbname {
            url.push_str(dbname);
        }
        if let Some(sslmode) = self.extra.get("sslmode") {
            url.push_str("?sslmode=");
            url.push_str(sslmode);
        }
        url
    }
}

impl fmt::Display for ConnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<(&str, &str)> = vec![("host", self.host.as_str())];
        let port = self.port.to_string();
        pairs.push(("port", port.as_str()));
        if let Some(dbname) = &self.dbname {
            pairs.push(("dbname", dbname.as_str()));
        }
        if let Some(user) = &self.user {
            pairs.push(("user", user.as_str()));
        }
        if let Some(password) = &self.password {
            pairs.push(("password", password.as_str()));
        }
        for (key, value) in &self.extra {
            pairs.push((key.as_str(), value.as_str()));
        }

        for (i, (key, value)) in pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, quote_value(value))?;
        }
        Ok(())
    }
}

/// Quotes a value when the bare form would not re-parse to the same string
fn quote_value(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quoting {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Scans the descriptor into raw (key, value) pairs
fn scan_pairs(input: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(ConnInfoError::MalformedPair(key));
        }

        let mut value = String::new();
        if chars.peek() == Some(&'\'') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err(ConnInfoError::UnterminatedQuote(key)),
                    },
                    '\'' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(ConnInfoError::UnterminatedQuote(key));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_descriptor() {
        let info = ConnInfo::parse("host=localhost port=5555 dbname=x user=y password='z z'")
            .unwrap();

        assert_eq!(info.host, "localhost");
        assert_eq!(info.port, 5555);
        assert_eq!(info.dbname.as_deref(), Some("x"));
        assert_eq!(info.user.as_deref(), Some("y"));
        assert_eq!(info.password.as_deref(), Some("z z"));
    }

    #[test]
    fn test_parse_extra_keys() {
        let info =
            ConnInfo::parse("host=127.0.0.1 port=5432 dbname=postgres user=postgres sslmode=disable")
                .unwrap();

        assert_eq!(info.extra.get("sslmode").map(String::as_str), Some("disable"));
    }

    #[test]
    fn test_parse_quoted_escapes() {
        let info = ConnInfo::parse(r"host=h port=1 password='it\'s \\here'").unwrap();
        assert_eq!(info.password.as_deref(), Some(r"it's \here"));
    }

    #[test]
    fn test_parse_missing_host() {
        let err = ConnInfo::parse("port=5432").unwrap_err();
        assert!(matches!(err, ConnInfoError::MissingHost));
    }

    #[test]
    fn test_parse_missing_port() {
        let err = ConnInfo::parse("host=localhost").unwrap_err();
        assert!(matches!(err, ConnInfoError::MissingPort));
    }

    #[test]
    fn test_parse_invalid_port_is_internal_error() {
        let err = ConnInfo::parse("host=localhost port=not-a-port").unwrap_err();
        assert!(matches!(err, ConnInfoError::InvalidPort(_)));
        assert!(err.to_string().starts_with("internal:"));
    }

    #[test]
    fn test_parse_malformed_pair() {
        let err = ConnInfo::parse("host=localhost port").unwrap_err();
        assert!(matches!(err, ConnInfoError::MalformedPair(_)));
    }

    #[test]
    fn test_parse_unterminated_quote() {
        let err = ConnInfo::parse("host=localhost port=5432 password='oops").unwrap_err();
        assert!(matches!(err, ConnInfoError::UnterminatedQuote(_)));
    }

    #[test]
    fn test_display_round_trip() {
        let original = "host=localhost port=5555 dbname=x user=y password='z z'";
        let info = ConnInfo::parse(original).unwrap();
        let rendered = info.to_string();

        // Rendering quotes only where needed, but must re-parse identically.
        let reparsed = ConnInfo::parse(&rendered).unwrap();
        assert_eq!(info, reparsed);
        assert!(rendered.contains("password='z z'"));
    }

    #[test]
    fn test_display_quotes_empty_value() {
        let mut info = ConnInfo::parse("host=h port=1").unwrap();
        info.password = Some(String::new());
        let rendered = info.to_string();
        assert!(rendered.contains("password=''"));
        assert_eq!(ConnInfo::parse(&rendered).unwrap(), info);
    }

    #[test]
    fn test_url_with_user_and_db() {
        let info =
            ConnInfo::parse("host=127.0.0.1 port=5433 dbname=postgres user=postgres sslmode=disable")
                .unwrap();
        assert_eq!(
            info.url(),
            "postgres://postgres@127.0.0.1:5433/postgres?sslmode=disable"
        );
    }

    #[test]
    fn test_url_with_password() {
        let info = ConnInfo::parse("host=db port=5432 dbname=app user=u password=s").unwrap();
        assert_eq!(info.url(), "postgres://u:s@db:5432/app");
    }
}
