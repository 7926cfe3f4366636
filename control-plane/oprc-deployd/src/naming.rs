//! Identifier normalisation shared by every builder.
//!
//! Names are recomputed on every deploy and must line up with objects created
//! by earlier deploys, so everything here is pure and total.

/// Max length of a DNS-1123 label.
pub const DNS_LABEL_MAX: usize = 63;

/// Environment-variable form: uppercase, every run of non-alphanumeric
/// characters collapsed to one `_`, no leading or trailing `_`.
pub fn sanitize(raw: &str) -> String {
    collapse(raw, '_').to_ascii_uppercase()
}

/// DNS-1123 label form: lowercase, runs of non-alphanumerics collapsed to
/// `-`, trimmed, at most 63 characters.
pub fn sanitize_dns_label(raw: &str) -> String {
    let mut s = collapse(raw, '-').to_ascii_lowercase();
    if s.len() > DNS_LABEL_MAX {
        s.truncate(DNS_LABEL_MAX);
        while s.ends_with('-') {
            s.pop();
        }
    }
    s
}

/// Key under which a resource's secret value (or file) is stored in the
/// application's Secret object, e.g. `r1.alias` + `password` → `r1_alias_password`.
pub fn secret_key_name(resource_name: &str, key: &str) -> String {
    format!("{}_{}", sanitize(resource_name), sanitize(key)).to_ascii_lowercase()
}

/// Path of a mounted file inside the dependency volume. The file name keeps
/// its extension; characters outside `[-._A-Za-z0-9]` become `_`.
pub fn mounted_file_name(resource_name: &str, file_name: &str) -> String {
    let file: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", sanitize(resource_name).to_ascii_lowercase(), file)
}

/// Whether `s` is a legal DNS-1123 label.
pub fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= DNS_LABEL_MAX
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn collapse(raw: &str, sep: char) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push(sep);
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_env_token(s: &str) -> bool {
        s.bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
            && !s.starts_with('_')
            && !s.ends_with('_')
    }

    #[test]
    fn sanitize_collapses_separators() {
        assert_eq!(sanitize("test_resource_key"), "TEST_RESOURCE_KEY");
        assert_eq!(
            sanitize("foo.var-with.mixed_stuff"),
            "FOO_VAR_WITH_MIXED_STUFF"
        );
        assert_eq!(
            sanitize("dots.are.not.allowed_key"),
            "DOTS_ARE_NOT_ALLOWED_KEY"
        );
        assert_eq!(sanitize("colon:are::not:allowed"), "COLON_ARE_NOT_ALLOWED");
        assert_eq!(sanitize("..leading.and.trailing.."), "LEADING_AND_TRAILING");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("-._:"), "");
    }

    #[test]
    fn sanitize_output_is_env_legal_and_idempotent() {
        let inputs = [
            "srvapp",
            "MixedCase.alias",
            "a:b:c",
            "__x__",
            "db-Primary.url",
            "ünïcode.key",
            "x..y--z::w",
        ];
        for raw in inputs {
            let once = sanitize(raw);
            assert!(is_env_token(&once), "{raw:?} -> {once:?}");
            assert_eq!(sanitize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn dns_label_is_lowercase_and_bounded() {
        assert_eq!(sanitize_dns_label("My_App.Name"), "my-app-name");
        assert_eq!(sanitize_dns_label("--x--"), "x");
        let long = "a.".repeat(64);
        let label = sanitize_dns_label(&long);
        assert!(label.len() <= DNS_LABEL_MAX);
        assert!(is_dns_label(&label));
        assert_eq!(sanitize_dns_label(""), "");
    }

    #[test]
    fn secret_keys_are_lowercase() {
        assert_eq!(secret_key_name("r1.alias", "password"), "r1_alias_password");
        assert_eq!(secret_key_name("r1", "password"), "r1_password");
        assert_eq!(mounted_file_name("My.Cert", "app.jks"), "my_cert_app.jks");
        assert_eq!(mounted_file_name("c", "a b/c.pem"), "c_a_b_c.pem");
    }

    #[test]
    fn dns_label_check() {
        assert!(is_dns_label("app-1"));
        assert!(!is_dns_label("App"));
        assert!(!is_dns_label("-app"));
        assert!(!is_dns_label("a_b"));
        assert!(!is_dns_label(""));
    }
}
