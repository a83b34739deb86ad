//! Minimal HTML rendering. No template engine: every page is a few lines
//! of interpolated markup around the values the core hands back.

use seedgate_core::{IssuedTicket, Verdict};

const STYLE: &str = "body{font-family:monospace;margin:3em auto;max-width:42em;padding:0 1em}\
h1{font-size:1.3em}code{background:#eee;padding:0.2em 0.4em;word-break:break-all}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <title>{title}</title><style>{STYLE}</style></head>\
         <body><h1>{title}</h1>{body}</body></html>"
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn ticket(issued: &IssuedTicket) -> String {
    let body = format!(
        "<p>Category: <strong>{}</strong> (<code>{}</code>)</p>\
         <p>Seed: <code>{}</code></p>\
         <p>Ticket: <code>{}</code></p>\
         <p>Issued {} UTC; live until {} UTC.</p>\
         <p>Keep the seed and the ticket together: both are needed for \
         validation.</p>",
        escape(issued.category_name.as_str()),
        escape(issued.category_url.as_str()),
        issued.seed,
        issued.ticket,
        issued.issued_at.format("%Y/%m/%d %H:%M:%S"),
        issued.live_until.format("%Y/%m/%d %H:%M:%S"),
    );
    page("Your seed is ready", &body)
}

pub fn verdict(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Live { remaining_secs } => {
            let body = format!(
                "<p>The ticket is <strong>LIVE</strong>.</p>\
                 <p>It expires in {} hours, {} minutes, and {} seconds.</p>",
                remaining_secs / 3600,
                (remaining_secs / 60) % 60,
                remaining_secs % 60
            );
            page("Ticket: LIVE", &body)
        }
        Verdict::Dead { expired_at } => {
            let body = format!(
                "<p>The ticket is <strong>DEAD</strong>; it stopped being \
                 viable at {} UTC.</p>\
                 <p>If the run was not submitted while the ticket was live, \
                 it cannot be accepted.</p>",
                expired_at.format("%Y/%m/%d %H:%M:%S")
            );
            page("Ticket: DEAD", &body)
        }
        Verdict::Invalid => page(
            "Ticket: INVALID",
            "<p>The ticket is <strong>INVALID or EXPIRED</strong>.</p>",
        ),
    }
}

pub fn server_time(epoch_secs: i64) -> String {
    page(
        "Server time",
        &format!("<p>Current server time: <code>{epoch_secs}</code> seconds past the Unix epoch.</p>"),
    )
}

pub fn failure() -> String {
    page(
        "Something went wrong",
        "<p>The server could not complete the request. Please try again in a moment.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_in_category_names() {
        assert_eq!(escape("a<b>&c"), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn verdict_pages_name_the_state() {
        assert!(verdict(&Verdict::Live { remaining_secs: 3700 }).contains("LIVE"));
        assert!(
            verdict(&Verdict::Dead { expired_at: chrono::Utc::now() }).contains("DEAD")
        );
        assert!(verdict(&Verdict::Invalid).contains("INVALID"));
    }
}
