use std::collections::HashMap;

/// One cookie as parsed from a `Set-Cookie` header: its value plus all of its
/// attributes, attribute names lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookieEntry {
    pub value: String,
    pub attributes: HashMap<String, String>,
}

impl SetCookieEntry {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Parse a combined `Set-Cookie` header into a map from cookie name to entry.
///
/// Malformed segments are skipped. This function never fails; garbage input
/// yields an empty map.
pub fn parse_set_cookie_header(header: &str) -> HashMap<String, SetCookieEntry> {
    let mut cookies = HashMap::new();

    for chunk in split_set_cookie_header(header) {
        let mut parts = chunk.split(';').map(str::trim);

        let Some(name_value) = parts.next() else {
            continue;
        };
        let (name, value) = name_value.split_once('=').unwrap_or((name_value, ""));
        if name.is_empty() {
            continue;
        }

        let mut attributes = HashMap::new();
        for attribute in parts {
            if attribute.is_empty() {
                continue;
            }
            let (attr_name, attr_value) = attribute.split_once('=').unwrap_or((attribute, ""));
            if attr_name.is_empty() {
                continue;
            }
            attributes.insert(attr_name.to_ascii_lowercase(), attr_value.to_owned());
        }

        cookies.insert(
            name.to_owned(),
            SetCookieEntry {
                value: value.to_owned(),
                attributes,
            },
        );
    }

    cookies
}

/// Split a combined `Set-Cookie` header into individual cookie strings.
///
/// A comma only separates two cookies when it is not part of an `Expires`
/// attribute, whose RFC date format embeds one
/// (`Expires=Wed, 21 Oct 2026 07:28:00 GMT`). We therefore keep buffering
/// past a comma as long as the buffered text contains an `expires=` whose
/// date was not yet terminated by `gmt`.
fn split_set_cookie_header(header: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buffer = String::new();
    let mut chars = header.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != ',' {
            buffer.push(ch);
            continue;
        }

        let recent = buffer.to_ascii_lowercase();
        if recent.contains("expires=") && !recent.contains("gmt") {
            buffer.push(ch);
            continue;
        }

        let trimmed = buffer.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_owned());
        }
        buffer.clear();
        if chars.peek() == Some(&' ') {
            chars.next();
        }
    }

    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_owned());
    }

    parts
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;

    use super::*;

    #[test]
    fn split_on_plain_commas() {
        let parts = split_set_cookie_header("a=1, b=2, c=3");
        assert_that(parts).is_equal_to(vec!["a=1", "b=2", "c=3"]);
    }

    #[test]
    fn split_keeps_comma_inside_expires_date() {
        let parts = split_set_cookie_header(
            "session_token=abc; Expires=Wed, 21 Oct 2026 07:28:00 GMT, other=xyz",
        );
        assert_that(parts).is_equal_to(vec![
            "session_token=abc; Expires=Wed, 21 Oct 2026 07:28:00 GMT",
            "other=xyz",
        ]);
    }

    #[test]
    fn parse_yields_one_record_per_cookie() {
        let cookies = parse_set_cookie_header(
            "session_token=abc; Expires=Wed, 21 Oct 2026 07:28:00 GMT, other=xyz",
        );
        assert_that(cookies.len()).is_equal_to(2);
        assert_that(cookies["session_token"].value.as_str()).is_equal_to("abc");
        assert_that(cookies["session_token"].attribute("expires"))
            .is_equal_to(Some("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_that(cookies["other"].value.as_str()).is_equal_to("xyz");
    }

    #[test]
    fn parse_lower_cases_attribute_names() {
        let cookies = parse_set_cookie_header("id=1; Max-Age=3600; HttpOnly; Path=/");
        let entry = &cookies["id"];
        assert_that(entry.attribute("max-age")).is_equal_to(Some("3600"));
        assert_that(entry.attribute("httponly")).is_equal_to(Some(""));
        assert_that(entry.attribute("path")).is_equal_to(Some("/"));
    }

    #[test]
    fn parse_keeps_equals_signs_in_values() {
        let cookies = parse_set_cookie_header("token=abc==def; Path=/");
        assert_that(cookies["token"].value.as_str()).is_equal_to("abc==def");
    }

    #[test]
    fn parse_cookie_without_value() {
        let cookies = parse_set_cookie_header("flag; Path=/");
        assert_that(cookies["flag"].value.as_str()).is_equal_to("");
    }

    #[test]
    fn parse_skips_nameless_segments() {
        let cookies = parse_set_cookie_header("=orphan, real=1");
        assert_that(cookies.len()).is_equal_to(1);
        assert_that(cookies.contains_key("real")).is_true();
    }

    #[test]
    fn parse_never_fails_on_garbage() {
        assert_that(parse_set_cookie_header("").is_empty()).is_true();
        assert_that(parse_set_cookie_header(", , ;;; =").is_empty()).is_true();
    }
}
