//! Minimal HTML for the login form and the landing pages.
//!
//! The real dashboard theme is served by the outer layer; these pages only
//! need to carry the form fields and the user-facing messages.

/// What the login form shows.
#[derive(Debug, Default)]
pub struct LoginPage<'a> {
    /// Pre-filled identity, set once a code has been sent.
    pub email: &'a str,
    pub notice: Option<&'a str>,
    pub error: Option<&'a str>,
}

pub fn login(page: &LoginPage<'_>) -> String {
    let mut html = String::from(
        "<!doctype html><html><head><title>BiteBuddy Login</title></head><body>",
    );
    html.push_str("<h1>Sign in</h1>");
    if let Some(error) = page.error {
        html.push_str(&format!(r#"<p class="error">{}</p>"#, escape(error)));
    }
    if let Some(notice) = page.notice {
        html.push_str(&format!(r#"<p class="notice">{}</p>"#, escape(notice)));
    }
    html.push_str(&format!(
        concat!(
            r#"<form method="post" action="/login">"#,
            r#"<input type="email" name="email" value="{}" required>"#,
            r#"<input type="text" name="otp" value="" autocomplete="one-time-code">"#,
            r#"<button type="submit">Continue</button>"#,
            "</form></body></html>"
        ),
        escape(page.email)
    ));
    html
}

pub fn landing(title: &str, role: &str, user_id: i64) -> String {
    format!(
        concat!(
            "<!doctype html><html><head><title>{title}</title></head><body>",
            "<h1>{title}</h1><p>Signed in as user {user_id} ({role})</p>",
            r#"<a href="/logout">Logout</a></body></html>"#
        ),
        title = escape(title),
        role = escape(role),
        user_id = user_id
    )
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_specials() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn login_prefills_email_and_shows_error() {
        let html = login(&LoginPage {
            email: "a@example.com\"><script>",
            notice: None,
            error: Some("Invalid Credentials"),
        });
        assert!(html.contains(r#"value="a@example.com&quot;&gt;&lt;script&gt;""#));
        assert!(html.contains("Invalid Credentials"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn empty_login_page_has_both_fields() {
        let html = login(&LoginPage::default());
        assert!(html.contains(r#"name="email" value="""#));
        assert!(html.contains(r#"name="otp""#));
        assert!(!html.contains("class=\"error\""));
    }
}
