//! Typed command surface over the raw protocol session.
//!
//! Each method here wraps one or a few protocol commands with a typed
//! signature, payload validation, and error mapping, so callers above the
//! session layer never touch raw frames. Browser-side failures that arrive
//! inside a successful response envelope (navigation `errorText`,
//! JavaScript `exceptionDetails`) are promoted to `CommandFailed` errors.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde_json::Value;

use crate::error::SessionError;
use crate::session::Session;

/// A DOM node id as assigned by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub i64);

/// Axis-aligned bounding box of a rendered element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    /// Center point, the coordinate used for synthesized mouse input.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

// ---------------------------------------------------------------------------
// Pure payload helpers
// ---------------------------------------------------------------------------

/// Extract the value from a `Runtime.evaluate` response, surfacing a thrown
/// exception as `CommandFailed`.
pub(crate) fn extract_eval_value(result: &Value) -> Result<Value, SessionError> {
    if let Some(exception) = result.get("exceptionDetails") {
        let message = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(|d| d.as_str())
            .or_else(|| exception.get("text").and_then(|t| t.as_str()))
            .unwrap_or("unknown JavaScript exception")
            .to_string();
        return Err(SessionError::CommandFailed { code: 0, message });
    }

    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Compute a bounding box from a `DOM.getBoxModel` content quad
/// (`[x1,y1, x2,y2, x3,y3, x4,y4]`).
pub(crate) fn box_from_quad(content: &[Value]) -> Result<ElementBox, SessionError> {
    if content.len() < 8 {
        return Err(SessionError::Protocol {
            detail: format!("content quad has {} values, expected 8", content.len()),
        });
    }

    let xs: Vec<f64> = content.iter().step_by(2).filter_map(|v| v.as_f64()).collect();
    let ys: Vec<f64> = content
        .iter()
        .skip(1)
        .step_by(2)
        .filter_map(|v| v.as_f64())
        .collect();

    if xs.len() < 4 || ys.len() < 4 {
        return Err(SessionError::Protocol {
            detail: "failed to parse content quad coordinates".to_string(),
        });
    }

    let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let width = max_x - min_x;
    let height = max_y - min_y;
    if width <= 0.0 || height <= 0.0 {
        return Err(SessionError::Protocol {
            detail: format!("element has zero or negative size: {width}x{height}"),
        });
    }

    Ok(ElementBox {
        x: min_x,
        y: min_y,
        width,
        height,
    })
}

/// Parameters for one synthesized mouse event at `(x, y)`.
pub(crate) fn mouse_event_params(kind: &str, x: f64, y: f64) -> Value {
    serde_json::json!({
        "type": kind,
        "x": x,
        "y": y,
        "button": "left",
        "clickCount": 1,
    })
}

/// Parameters for one synthesized key event.
pub(crate) fn key_event_params(kind: &str, key: &str) -> Value {
    serde_json::json!({
        "type": kind,
        "key": key,
    })
}

// ---------------------------------------------------------------------------
// Typed commands
// ---------------------------------------------------------------------------

impl Session {
    /// Navigate the attached target to `url`.
    ///
    /// Resolves once the browser acknowledges the navigation, not when the
    /// page finishes loading; pair with [`Session::wait_for_load`] when load
    /// completion matters. A navigation the browser rejects (DNS failure,
    /// blocked scheme) arrives as `errorText` inside a successful response
    /// and is surfaced as `CommandFailed`.
    pub async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let result = self
            .command("Page.navigate", serde_json::json!({ "url": url }), None)
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(SessionError::CommandFailed {
                code: 0,
                message: format!("navigation to '{url}' failed: {error_text}"),
            });
        }
        Ok(())
    }

    /// Wait until the current page fires its load event.
    ///
    /// Subscribes before waiting, so a load that races the call is still
    /// observed. Returns `CommandTimeout` if the event does not arrive
    /// within `timeout`.
    pub async fn wait_for_load(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut events = self.subscribe("Page.loadEventFired");
        match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SessionError::ConnectionLost),
            Err(_) => Err(SessionError::CommandTimeout {
                method: "Page.loadEventFired".to_string(),
                duration: timeout,
            }),
        }
    }

    /// Evaluate a JavaScript expression in the page and return its value.
    ///
    /// Promises are awaited; the result is marshalled by value. A thrown
    /// exception becomes `CommandFailed` carrying the exception text.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, SessionError> {
        self.evaluate_with_timeout(expression, None).await
    }

    /// [`Session::evaluate`] with an explicit deadline, for recipe scripts
    /// that declare their own timeout.
    pub async fn evaluate_with_timeout(
        &self,
        expression: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, SessionError> {
        let result = self
            .command(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                timeout,
            )
            .await?;

        extract_eval_value(&result)
    }

    /// Capture a PNG screenshot of the attached target.
    pub async fn screenshot(&self) -> Result<Vec<u8>, SessionError> {
        let result = self
            .command(
                "Page.captureScreenshot",
                serde_json::json!({ "format": "png" }),
                None,
            )
            .await?;

        let data_b64 = result
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| SessionError::Protocol {
                detail: "Page.captureScreenshot did not return 'data' field".to_string(),
            })?;

        B64.decode(data_b64).map_err(|e| SessionError::Protocol {
            detail: format!("failed to decode screenshot base64: {e}"),
        })
    }

    /// Find a single element matching a CSS selector.
    ///
    /// Returns `Ok(None)` when nothing matches.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, SessionError> {
        let root_id = self.document_root().await?;

        let result = self
            .command(
                "DOM.querySelector",
                serde_json::json!({ "nodeId": root_id, "selector": selector }),
                None,
            )
            .await?;

        let node_id = result.get("nodeId").and_then(|n| n.as_i64()).unwrap_or(0);
        if node_id == 0 {
            Ok(None)
        } else {
            Ok(Some(NodeId(node_id)))
        }
    }

    /// Find all elements matching a CSS selector. Empty vector when nothing
    /// matches.
    pub async fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, SessionError> {
        let root_id = self.document_root().await?;

        let result = self
            .command(
                "DOM.querySelectorAll",
                serde_json::json!({ "nodeId": root_id, "selector": selector }),
                None,
            )
            .await?;

        Ok(result
            .get("nodeIds")
            .and_then(|n| n.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_i64())
                    .filter(|id| *id != 0)
                    .map(NodeId)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Click the element matching `selector` at its center point.
    pub async fn click(&self, selector: &str) -> Result<(), SessionError> {
        let node_id =
            self.query_selector(selector)
                .await?
                .ok_or_else(|| SessionError::TargetNotFound {
                    selector: selector.to_string(),
                })?;

        let bbox = self.element_box(node_id).await?;
        let (cx, cy) = bbox.center();

        self.command(
            "Input.dispatchMouseEvent",
            mouse_event_params("mousePressed", cx, cy),
            None,
        )
        .await?;
        self.command(
            "Input.dispatchMouseEvent",
            mouse_event_params("mouseReleased", cx, cy),
            None,
        )
        .await?;
        Ok(())
    }

    /// Type `text` into the currently focused element.
    pub async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        self.command(
            "Input.insertText",
            serde_json::json!({ "text": text }),
            None,
        )
        .await?;
        Ok(())
    }

    /// Press and release a single key (e.g. "Enter", "Tab").
    pub async fn press_key(&self, key: &str) -> Result<(), SessionError> {
        self.command(
            "Input.dispatchKeyEvent",
            key_event_params("keyDown", key),
            None,
        )
        .await?;
        self.command(
            "Input.dispatchKeyEvent",
            key_event_params("keyUp", key),
            None,
        )
        .await?;
        Ok(())
    }

    /// The current document URL.
    pub async fn current_url(&self) -> Result<String, SessionError> {
        let value = self.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SessionError::Protocol {
                detail: "window.location.href did not evaluate to a string".to_string(),
            })
    }

    /// The current document title.
    pub async fn title(&self) -> Result<String, SessionError> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// The document readiness state ("loading", "interactive", "complete").
    pub async fn ready_state(&self) -> Result<String, SessionError> {
        let value = self.evaluate("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Serialized outer HTML of the document.
    pub async fn html(&self) -> Result<String, SessionError> {
        let value = self
            .evaluate("document.documentElement.outerHTML")
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SessionError::Protocol {
                detail: "outerHTML did not evaluate to a string".to_string(),
            })
    }

    async fn document_root(&self) -> Result<i64, SessionError> {
        let result = self
            .command("DOM.getDocument", serde_json::json!({}), None)
            .await?;

        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(|n| n.as_i64())
            .ok_or_else(|| SessionError::Protocol {
                detail: "DOM.getDocument did not return a root nodeId".to_string(),
            })
    }

    async fn element_box(&self, node_id: NodeId) -> Result<ElementBox, SessionError> {
        let result = self
            .command(
                "DOM.getBoxModel",
                serde_json::json!({ "nodeId": node_id.0 }),
                None,
            )
            .await?;

        let content = result
            .get("model")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_array())
            .ok_or_else(|| SessionError::Protocol {
                detail: "DOM.getBoxModel did not return a content quad".to_string(),
            })?;

        box_from_quad(content)
    }
}
