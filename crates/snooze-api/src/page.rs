//! Waiting page rendering.
//!
//! The page comes from the gateway's per-route maintenance template with a
//! polling script spliced in. The script asks the same URL for the wake
//! status every few seconds and reloads once the service is READY, or as
//! soon as a response lacks the status header: that means the gateway
//! already routes to the real backend.

use snooze_wake::WakeContext;

pub const STARTING_MESSAGE: &str = "Your app is starting, please wait ...";
pub const REDIRECT_HINT: &str = "You will be redirected automatically when it's ready";

/// Interval between client-side status checks.
pub const CHECK_EVERY_MILLIS: u64 = 4_000;

/// Value of the status header that selects the status sub-protocol.
pub const STATUS_REQUEST: &str = "status";

/// The client-side polling script.
pub fn polling_script(status_header: &str) -> String {
    format!(
        r#"
<script type="text/javascript">
  function checkState() {{
    fetch(window.location.pathname, {{
      headers: {{ 'Accept': 'application/json', '{status_header}': '{STATUS_REQUEST}' }}
    }}).then(r => {{
      if (!r.headers.get('{status_header}')) {{
        window.location.reload();
      }} else {{
        return r.json();
      }}
    }}).then(status => {{
      if (status && status.status === 'READY') {{
        window.location.reload();
      }}
    }}).catch(() => window.location.reload());
  }}
  checkState();
  setInterval(checkState, {CHECK_EVERY_MILLIS});
</script>
"#
    )
}

/// Splice the polling script into a gateway template and fill in its
/// placeholders.
pub fn render_template(raw: &str, status_header: &str) -> String {
    let script = polling_script(status_header);
    let mut page = match (raw.contains("<body"), raw.rfind("</body>")) {
        (true, Some(end)) => {
            let mut page = String::with_capacity(raw.len() + script.len());
            page.push_str(&raw[..end]);
            page.push_str(&script);
            page.push_str(&raw[end..]);
            page
        }
        _ => format!("{raw}{script}"),
    };

    for (placeholder, value) in [
        ("${message}", STARTING_MESSAGE),
        ("${cause}", REDIRECT_HINT),
        ("${otoroshiMessage}", STARTING_MESSAGE),
        ("${errorId}", ""),
        ("${status}", ""),
    ] {
        page = page.replace(placeholder, value);
    }
    page
}

/// Built-in page served when the gateway template is unavailable.
pub fn fallback_page(status_header: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <title>snooze</title>
    <meta name="robots" content="noindex, nofollow">
  </head>
  <body style="background-color: rgb(55,55,55); color: white; margin: 0; height: 100vh; display: flex; flex-direction: column; justify-content: center; align-items: center; font-family: sans-serif;">
    <h3>{STARTING_MESSAGE}</h3>
    <h5>{REDIRECT_HINT}</h5>
{script}  </body>
</html>
"#,
        script = polling_script(status_header),
    )
}

/// The waiting page for a service. Rendered templates are cached; the
/// fallback is not, so a recovered gateway is picked up on the next hit.
pub async fn waiting_page(ctx: &WakeContext, route_id: &str, status_header: &str) -> String {
    ctx.templates
        .get_or_populate(
            route_id,
            || async {
                ctx.gateway
                    .waiting_template(route_id)
                    .await
                    .map(|raw| render_template(&raw, status_header))
            },
            |_| fallback_page(status_header),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_goes_inside_body() {
        let page = render_template(
            "<html><body><h1>${message}</h1><p>${cause}</p></body></html>",
            "x-snooze",
        );
        let script_at = page.find("<script").unwrap();
        assert!(script_at < page.find("</body>").unwrap());
        assert!(page.contains("<h1>Your app is starting, please wait ...</h1>"));
        assert!(page.contains(REDIRECT_HINT));
        assert!(page.ends_with("</body></html>"));
    }

    #[test]
    fn bodyless_template_gets_script_appended() {
        let page = render_template("<div>${otoroshiMessage} ${errorId}${status}</div>", "x-snooze");
        assert!(page.starts_with("<div>Your app is starting, please wait ... </div>"));
        assert!(page.trim_end().ends_with("</script>"));
    }

    #[test]
    fn script_uses_configured_status_header() {
        let script = polling_script("X-Custom");
        assert!(script.contains("'X-Custom': 'status'"));
        assert!(script.contains("r.headers.get('X-Custom')"));
        assert!(script.contains("setInterval(checkState, 4000)"));
    }

    #[test]
    fn fallback_page_polls() {
        let page = fallback_page("x-snooze");
        assert!(page.contains(STARTING_MESSAGE));
        assert!(page.contains("checkState()"));
        assert!(page.trim_end().ends_with("</html>"));
    }
}
