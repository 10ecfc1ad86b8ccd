//! Shared polling utilities: human-like delay, network-idle waiting, and a
//! best-effort bot-challenge detector. Grounded on the teacher's
//! `CdpClientImpl::navigate` readyState-polling loop — timeouts here are
//! never fatal, they just stop the poll early.

use crate::cdp::{CdpClient, EvaluationResult};
use crate::Error;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Sleep for a uniformly-random duration in `[min_ms, max_ms]`.
///
/// The random draw happens before the `.await` so the generator never has
/// to cross a suspension point.
pub async fn human_delay(min_ms: u64, max_ms: u64) {
    let ms = {
        let mut rng = rand::thread_rng();
        rng.gen_range(min_ms..=max_ms)
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Poll `document.readyState` until it reaches `complete`/`interactive` or
/// `timeout` elapses. Expiry is logged by the caller, never returned as an
/// error — this is a best-effort wait.
pub async fn wait_dom_ready(client: &Arc<dyn CdpClient>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        match client.evaluate("document.readyState", false).await {
            Ok(EvaluationResult::String(state)) if state == "complete" || state == "interactive" => return,
            _ => {}
        }
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Poll a network-idle heuristic: no change in `performance.getEntriesByType
/// ('resource').length` across two consecutive samples 300ms apart.
pub async fn wait_network_idle(client: &Arc<dyn CdpClient>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let script = "performance.getEntriesByType('resource').length";

    let mut last = match client.evaluate(script, false).await {
        Ok(EvaluationResult::Number(n)) => n,
        _ => return,
    };

    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let current = match client.evaluate(script, false).await {
            Ok(EvaluationResult::Number(n)) => n,
            _ => return,
        };
        if (current - last).abs() < f64::EPSILON {
            return;
        }
        last = current;
    }
}

const CHALLENGE_MARKERS: &[&str] = &[
    "checking your browser",
    "just a moment",
    "cf-browser-verification",
    "recaptcha",
    "hcaptcha",
    "verify you are human",
];

/// Title/body heuristic for common bot-detection interstitials. This is the
/// full extent of challenge-page handling: detection plus the caller's own
/// polling wait, nothing more.
pub fn looks_like_challenge_page(title: &str, body_snippet: &str) -> bool {
    let haystack = format!("{} {}", title.to_lowercase(), body_snippet.to_lowercase());
    CHALLENGE_MARKERS.iter().any(|marker| haystack.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_challenge_page_positive() {
        assert!(looks_like_challenge_page("Just a moment...", ""));
        assert!(looks_like_challenge_page("", "Please verify you are human"));
    }

    #[test]
    fn test_looks_like_challenge_page_negative() {
        assert!(!looks_like_challenge_page("ChatGPT", "<div>hello</div>"));
    }

    #[tokio::test]
    async fn test_human_delay_respects_bounds() {
        let start = Instant::now();
        human_delay(10, 20).await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
