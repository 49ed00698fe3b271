//! Placeholder substitution for protocol templates.
//!
//! `{user}`, `{host}` and `{hostname}` are replaced with values from the
//! device target. Braces around anything that is not a lowercase identifier
//! (regex quantifiers such as `\d{1,3}`) are left alone.

use std::borrow::Cow;

use crate::error::ProtocolError;
use crate::target::DeviceTarget;

/// Values available to templates.
#[derive(Debug, Clone, Copy)]
pub struct Variables<'a> {
    pub user: &'a str,
    pub host: &'a str,
    pub hostname: &'a str,
}

impl<'a> Variables<'a> {
    /// Variables for a device target.
    pub fn from_target(target: &'a DeviceTarget) -> Self {
        Self {
            user: target.user(),
            host: target.host(),
            hostname: target.short_name(),
        }
    }

    /// Placeholder values used to check templates without a real target.
    pub(crate) fn sample() -> Variables<'static> {
        Variables {
            user: "user",
            host: "host.example",
            hostname: "host",
        }
    }

    fn get(&self, name: &str) -> Option<&'a str> {
        match name {
            "user" => Some(self.user),
            "host" => Some(self.host),
            "hostname" => Some(self.hostname),
            _ => None,
        }
    }
}

/// Substitute placeholders verbatim.
pub fn substitute(template: &str, vars: &Variables<'_>) -> Result<String, ProtocolError> {
    render(template, vars, Cow::Borrowed)
}

/// Substitute placeholders, escaping values for use inside a regex.
pub fn substitute_escaped(template: &str, vars: &Variables<'_>) -> Result<String, ProtocolError> {
    render(template, vars, |v| Cow::Owned(regex::escape(v)))
}

fn render<'v>(
    template: &str,
    vars: &Variables<'v>,
    encode: impl Fn(&'v str) -> Cow<'v, str>,
) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let name_len = after
            .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
            .unwrap_or(after.len());
        let is_placeholder = name_len > 0 && after[name_len..].starts_with('}');

        if !is_placeholder {
            out.push('{');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        let value = vars
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownPlaceholder {
                placeholder: name.to_string(),
                template: template.to_string(),
            })?;
        out.push_str(&encode(value));
        rest = &after[name_len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Variables<'static> {
        Variables {
            user: "alice",
            host: "r1.example.net",
            hostname: "r1",
        }
    }

    #[test]
    fn test_substitute_all_placeholders() {
        let out = substitute("{user}@{host}'s password: <{hostname}>", &vars()).unwrap();
        assert_eq!(out, "alice@r1.example.net's password: <r1>");
    }

    #[test]
    fn test_non_placeholder_braces_pass_through() {
        assert_eq!(substitute(r"\d{1,3}", &vars()).unwrap(), r"\d{1,3}");
        assert_eq!(substitute("{", &vars()).unwrap(), "{");
        assert_eq!(substitute("{}", &vars()).unwrap(), "{}");
        assert_eq!(substitute("{user", &vars()).unwrap(), "{user");
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = substitute("{username}>", &vars()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnknownPlaceholder { ref placeholder, .. } if placeholder == "username"
        ));
    }

    #[test]
    fn test_escaped_substitution() {
        let out = substitute_escaped(r"^{host}\s*$", &vars()).unwrap();
        assert_eq!(out, r"^r1\.example\.net\s*$");
    }

    #[test]
    fn test_from_target() {
        let target = DeviceTarget::new("sw9.dc1.example", "bob");
        let vars = Variables::from_target(&target);
        assert_eq!(vars.hostname, "sw9");
        assert_eq!(vars.host, "sw9.dc1.example");
        assert_eq!(vars.user, "bob");
    }
}
