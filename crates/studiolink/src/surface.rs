//! Host control surface interface.

use serde_json::Value;

use studiolink_catalog::BindingDescriptor;

use crate::connection::ConnectionState;

/// What the engine needs from the application hosting the buttons.
///
/// Calls arrive from engine tasks; implementations must not block.
pub trait ControlSurface: Send + Sync {
    /// Replace the set of control definitions offered to the user.
    fn define_controls(&self, descriptors: &[BindingDescriptor]);

    /// Re-evaluate the lit state of these controls.
    fn check_controls(&self, control_ids: &[String]);

    /// Re-evaluate everything.
    fn refresh_all(&self);

    fn status_changed(&self, state: ConnectionState, message: Option<&str>);

    /// Evaluate a user expression for a value-adjust control. `current` is
    /// the control's last known value.
    ///
    /// The default accepts plain numeric literals only.
    fn evaluate_expression(&self, expression: &str, current: Option<&Value>) -> Result<Value, String> {
        let _ = current;
        let trimmed = expression.trim();
        trimmed
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("cannot evaluate `{trimmed}`"))
    }
}

/// Surface that only logs. Used by the headless CLI.
#[derive(Debug, Default)]
pub struct LoggingSurface;

impl ControlSurface for LoggingSurface {
    fn define_controls(&self, descriptors: &[BindingDescriptor]) {
        let feedbacks = descriptors.iter().filter(|d| d.is_feedback()).count();
        tracing::info!(
            actions = descriptors.len() - feedbacks,
            feedbacks,
            "Control definitions updated"
        );
    }

    fn check_controls(&self, control_ids: &[String]) {
        tracing::info!(controls = ?control_ids, "Controls changed");
    }

    fn refresh_all(&self) {
        tracing::debug!("Refresh all controls");
    }

    fn status_changed(&self, state: ConnectionState, message: Option<&str>) {
        match message {
            Some(message) => tracing::info!(state = %state, message, "Studio status"),
            None => tracing::info!(state = %state, "Studio status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_expression_evaluation() {
        let surface = LoggingSurface;
        assert_eq!(surface.evaluate_expression(" 42 ", None), Ok(json!(42.0)));
        assert!(surface.evaluate_expression("$(internal:volume)", None).is_err());
    }
}
