//! Human-behavior simulation for site adapters.
//!
//! Grounded on the teacher's `stealth::behavior::BehaviorSimulatorImpl`: all
//! randomness is pre-generated into a plan before any `.await`, since
//! `rand::ThreadRng` is not `Send` and cannot be held across a suspension
//! point. Distributions are uniform, per spec, not the teacher's Gaussian.

use crate::cdp::CdpClient;
use crate::Error;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Escape a string for embedding in a single-quoted JS literal.
pub(crate) fn escape_js(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'").replace('"', "\\\"")
}

fn query(selector: &str) -> String {
    format!("document.querySelector('{}')", escape_js(selector))
}

fn execute_on(selector: &str, js: &str) -> String {
    format!("(() => {{ const el = {}; if (!el) return null; {} }})()", query(selector), js)
}

/// `{found, visible, enabled}` probe, grounded on the teacher's
/// `is_visible_script`/`is_enabled_script` pair, merged into one round trip.
fn probe_script(selector: &str) -> String {
    execute_on(
        selector,
        r#"const style = window.getComputedStyle(el);
           const rect = el.getBoundingClientRect();
           let visible = true;
           if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') visible = false;
           else if (rect.width === 0 || rect.height === 0) visible = false;
           const enabled = !(el.disabled || el.readOnly);
           return JSON.stringify({found: true, visible, enabled});"#,
    )
}

/// Walk `selectors` in order, returning the first whose element is both
/// visible and enabled.
pub async fn locate_visible_enabled(
    client: &Arc<dyn CdpClient>,
    selectors: &[String],
) -> Result<String, Error> {
    for selector in selectors {
        let result = client.evaluate(&probe_script(selector), false).await;
        let text = match result {
            Ok(crate::cdp::EvaluationResult::String(s)) => s,
            _ => continue,
        };
        let parsed: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let visible = parsed.get("visible").and_then(|v| v.as_bool()).unwrap_or(false);
        let enabled = parsed.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false);
        if visible && enabled {
            return Ok(selector.clone());
        }
    }
    Err(Error::input_not_found("no candidate selector was visible and enabled"))
}

pub async fn hover(client: &Arc<dyn CdpClient>, selector: &str) -> Result<(), Error> {
    let script = execute_on(
        selector,
        "el.dispatchEvent(new MouseEvent('mouseover', {bubbles: true, cancelable: true})); return 'hovered';",
    );
    client.evaluate(&script, false).await?;
    Ok(())
}

pub async fn click(client: &Arc<dyn CdpClient>, selector: &str) -> Result<(), Error> {
    let script = execute_on(
        selector,
        "el.scrollIntoView({behavior: 'smooth', block: 'center'}); el.click(); return 'clicked';",
    );
    client.evaluate(&script, false).await?;
    Ok(())
}

pub async fn focus(client: &Arc<dyn CdpClient>, selector: &str) -> Result<(), Error> {
    let script = execute_on(selector, "el.focus(); return 'focused';");
    client.evaluate(&script, false).await?;
    Ok(())
}

/// Select-all then delete, mirroring the clear-before-typing step of the
/// adapter algorithm.
pub async fn clear(client: &Arc<dyn CdpClient>, selector: &str) -> Result<(), Error> {
    let script = execute_on(
        selector,
        r#"el.focus();
           if (typeof el.select === 'function') el.select();
           else document.execCommand('selectAll');
           if ('value' in el) el.value = ''; else el.textContent = '';
           el.dispatchEvent(new Event('input', {bubbles: true}));
           return 'cleared';"#,
    );
    client.evaluate(&script, false).await?;
    Ok(())
}

fn append_script(selector: &str, chunk: &str) -> String {
    execute_on(
        selector,
        &format!(
            r#"if ('value' in el) el.value = (el.value || '') + '{chunk}';
               else el.textContent = (el.textContent || '') + '{chunk}';
               el.dispatchEvent(new Event('input', {{bubbles: true}}));
               return 'typed';"#,
            chunk = escape_js(chunk)
        ),
    )
}

struct TypingStep {
    chunk: String,
    keystroke_delay_ms: u64,
    extra_delay_ms: Option<u64>,
}

/// Pre-generate the entire typing plan: 1-3 character chunks, a per-char
/// delay uniformly sampled in 40-120ms summed per chunk, and a 0.2
/// probability of an extra 80-280ms pause after the chunk.
fn plan_typing(text: &str) -> Vec<TypingStep> {
    let chars: Vec<char> = text.chars().collect();
    let mut rng = rand::thread_rng();
    let mut plan = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let remaining = chars.len() - i;
        let chunk_len = rng.gen_range(1..=3.min(remaining.max(1))).min(remaining);
        let chunk: String = chars[i..i + chunk_len].iter().collect();

        let mut keystroke_delay_ms = 0u64;
        for _ in 0..chunk_len {
            keystroke_delay_ms += rng.gen_range(40..=120);
        }

        let extra_delay_ms = if rng.gen::<f64>() < 0.2 {
            Some(rng.gen_range(80..=280))
        } else {
            None
        };

        plan.push(TypingStep {
            chunk,
            keystroke_delay_ms,
            extra_delay_ms,
        });
        i += chunk_len;
    }

    plan
}

/// Emit `text` into the element matched by `selector` in human-like chunks.
pub async fn type_human(client: &Arc<dyn CdpClient>, selector: &str, text: &str) -> Result<(), Error> {
    let plan = plan_typing(text);

    for step in plan {
        client.evaluate(&append_script(selector, &step.chunk), false).await?;
        tokio::time::sleep(Duration::from_millis(step.keystroke_delay_ms)).await;
        if let Some(extra) = step.extra_delay_ms {
            tokio::time::sleep(Duration::from_millis(extra)).await;
        }
    }

    Ok(())
}

/// 1.2-2.0s "think" delay before locating the input.
pub async fn think_delay() {
    let ms = rand::thread_rng().gen_range(1_200..=2_000);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// 0.8-1.6s delay before submitting.
pub async fn pre_send_delay() {
    let ms = rand::thread_rng().gen_range(800..=1_600);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Short random delay used around hover/click (per spec: "short random
/// delay" / "small per-key delay").
pub async fn short_delay() {
    let ms = rand::thread_rng().gen_range(50..=200);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_typing_covers_all_chars() {
        let plan = plan_typing("hello world");
        let total: usize = plan.iter().map(|s| s.chunk.chars().count()).sum();
        assert_eq!(total, "hello world".chars().count());
        for step in &plan {
            assert!(step.chunk.chars().count() <= 3);
            assert!(step.keystroke_delay_ms >= 40);
        }
    }

    #[test]
    fn test_plan_typing_empty() {
        assert!(plan_typing("").is_empty());
    }

    #[test]
    fn test_escape_js_handles_quotes() {
        assert_eq!(escape_js("it's \"quoted\""), "it\\'s \\\"quoted\\\"");
    }
}
