//! Next-step advice for installer wizards.
//!
//! Works on an element list already captured by the UI automation driver and
//! picks the control that moves a typical setup wizard forward.
use crate::schema::{UiAction, UiElement, UiSelector};

/// Navigation captions in the order a wizard should be driven.
const NAVIGATION_PRIORITY: &[&str] = &[
    "I agree", "I accept", "Agree", "Next", "Next >", "Install", "Finish", "Close",
];

const TOGGLE_CONTROLS: &[&str] = &["CheckBox", "RadioButton"];

/// Choose the next click, or `None` when nothing recognizable is on screen.
///
/// `history` holds actions already issued; a terms toggle that was clicked
/// before counts as accepted even if the driver does not report its state.
pub fn decide_next_action(elements: &[UiElement], history: &[UiAction]) -> Option<UiAction> {
    tracing::debug!(elements = elements.len(), "choosing next wizard action");

    if let Some(toggle) = elements
        .iter()
        .find(|element| is_unaccepted_terms_toggle(element, history))
    {
        return Some(click(toggle.title.clone(), &toggle.control_type, "Accepting terms"));
    }

    for keyword in NAVIGATION_PRIORITY {
        if let Some(button) = elements
            .iter()
            .find(|element| element.title.trim().eq_ignore_ascii_case(keyword))
        {
            let title = button.title.trim().to_string();
            let reason = format!("Clicking navigation button '{title}'");
            return Some(click(title, &button.control_type, &reason));
        }
    }
    None
}

/// Render the automation statement for an action.
pub fn render_step_code(action: Option<&UiAction>) -> String {
    match action {
        Some(UiAction::Click { selector, .. }) => format!(
            "dlg.child_window(title='{}', control_type='{}').click_input()",
            escape_single_quotes(&selector.title),
            escape_single_quotes(&selector.control_type)
        ),
        None => "# No action determined".to_string(),
    }
}

fn is_unaccepted_terms_toggle(element: &UiElement, history: &[UiAction]) -> bool {
    if !element.title.to_lowercase().contains("agree") {
        return false;
    }
    if !TOGGLE_CONTROLS.contains(&element.control_type.as_str()) {
        return false;
    }
    if element.toggle_state.as_deref() == Some("on") {
        return false;
    }
    !history.iter().any(|action| match action {
        UiAction::Click { selector, .. } => {
            selector.title == element.title && selector.control_type == element.control_type
        }
    })
}

fn click(title: String, control_type: &str, reason: &str) -> UiAction {
    UiAction::Click {
        selector: UiSelector {
            title,
            control_type: control_type.to_string(),
        },
        reason: reason.to_string(),
    }
}

fn escape_single_quotes(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}
