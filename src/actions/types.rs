//! Typed actions produced from model output.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// Upper bound of the relative coordinate space the model works in.
pub const RELATIVE_COORDINATE_MAX: u32 = 1000;

/// A point in relative screen space, both components in `[0, 1000]`.
///
/// Serializes as `[x, y]`, the form the model writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    x: u32,
    y: u32,
}

impl Coordinate {
    /// Create a coordinate, rejecting components outside `[0, 1000]`.
    pub fn new(x: i64, y: i64) -> Option<Self> {
        let max = RELATIVE_COORDINATE_MAX as i64;
        if (0..=max).contains(&x) && (0..=max).contains(&y) {
            Some(Self {
                x: x as u32,
                y: y as u32,
            })
        } else {
            None
        }
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Map onto absolute pixels for a screen of the given size.
    ///
    /// The result always lies inside the screen: `x < width`, `y < height`.
    /// Callers must ensure both dimensions are non-zero.
    pub fn to_absolute(&self, width: u32, height: u32) -> (u32, u32) {
        (
            scale_axis(self.x, width),
            scale_axis(self.y, height),
        )
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.x, self.y].serialize(serializer)
    }
}

fn scale_axis(relative: u32, size: u32) -> u32 {
    let absolute = relative as u64 * size as u64 / RELATIVE_COORDINATE_MAX as u64;
    absolute.min(size.saturating_sub(1) as u64) as u32
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.x, self.y)
    }
}

/// A safe literal value accepted inside a `do(...)` call.
///
/// Lists only ever hold numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    List(Vec<Literal>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Operation selected by the `action` key of a `do(...)` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ActionName {
    Launch,
    Tap,
    Type,
    TypeName,
    Swipe,
    Back,
    Home,
    DoubleTap,
    LongPress,
    Wait,
    TakeOver,
    Note,
    CallApi,
    Interact,
    /// Name the model emitted that no handler knows.
    Unknown(String),
}

impl ActionName {
    /// Resolve a wire name. Accepts the prompt spelling and compact aliases.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "Launch" => ActionName::Launch,
            "Tap" => ActionName::Tap,
            "Type" => ActionName::Type,
            "Type_Name" | "TypeName" => ActionName::TypeName,
            "Swipe" => ActionName::Swipe,
            "Back" => ActionName::Back,
            "Home" => ActionName::Home,
            "Double Tap" | "DoubleTap" | "Double_Tap" => ActionName::DoubleTap,
            "Long Press" | "LongPress" | "Long_Press" => ActionName::LongPress,
            "Wait" => ActionName::Wait,
            "Take_over" | "TakeOver" | "Take_Over" => ActionName::TakeOver,
            "Note" => ActionName::Note,
            "Call_API" | "CallApi" | "CallAPI" => ActionName::CallApi,
            "Interact" => ActionName::Interact,
            other => ActionName::Unknown(other.to_string()),
        }
    }

    /// Canonical wire name, as written in the system prompt.
    pub fn as_wire(&self) -> &str {
        match self {
            ActionName::Launch => "Launch",
            ActionName::Tap => "Tap",
            ActionName::Type => "Type",
            ActionName::TypeName => "Type_Name",
            ActionName::Swipe => "Swipe",
            ActionName::Back => "Back",
            ActionName::Home => "Home",
            ActionName::DoubleTap => "Double Tap",
            ActionName::LongPress => "Long Press",
            ActionName::Wait => "Wait",
            ActionName::TakeOver => "Take_over",
            ActionName::Note => "Note",
            ActionName::CallApi => "Call_API",
            ActionName::Interact => "Interact",
            ActionName::Unknown(name) => name,
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Parameters of a `do(...)` call other than `action`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Sensitive-operation marker on taps, handoff reason on `Take_over`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// Keys with no dedicated field, kept verbatim.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Literal>,
}

/// A `do(...)` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoAction {
    pub name: ActionName,
    #[serde(flatten)]
    pub params: ActionParams,
}

/// An action parsed from model output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "_metadata", rename_all = "snake_case")]
pub enum Action {
    Do(DoAction),
    Finish { message: String },
}

impl Action {
    /// A `do(...)` action with no parameters.
    pub fn op(name: ActionName) -> Self {
        Action::Do(DoAction {
            name,
            params: ActionParams::default(),
        })
    }

    /// A `do(...)` action with the given parameters.
    pub fn with_params(name: ActionName, params: ActionParams) -> Self {
        Action::Do(DoAction { name, params })
    }

    pub fn tap(element: Coordinate) -> Self {
        Self::with_params(
            ActionName::Tap,
            ActionParams {
                element: Some(element),
                ..Default::default()
            },
        )
    }

    pub fn finish(message: impl Into<String>) -> Self {
        Action::Finish {
            message: message.into(),
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Action::Finish { .. })
    }

    /// The `message` carried by the action, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Action::Finish { message } => Some(message),
            Action::Do(action) => action.params.message.as_deref(),
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &str {
        match self {
            Action::Finish { .. } => "finish",
            Action::Do(action) => action.name.as_wire(),
        }
    }
}

/// Result of an action execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub should_finish: bool,
    pub message: Option<String>,
    /// Set when the result came from a declined confirmation.
    pub requires_confirmation: bool,
}

impl ActionResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            should_finish: false,
            message: None,
            requires_confirmation: false,
        }
    }

    /// Successful result with an informational message.
    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success()
        }
    }

    /// Create a recoverable failure result.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            should_finish: false,
            message: Some(message.into()),
            requires_confirmation: false,
        }
    }

    /// Create a finish result.
    pub fn finish(message: Option<String>) -> Self {
        Self {
            success: true,
            should_finish: true,
            message,
            requires_confirmation: false,
        }
    }

    /// The user refused a sensitive operation. Terminal for the task.
    pub fn declined() -> Self {
        Self {
            success: false,
            should_finish: true,
            message: Some("User cancelled sensitive operation".to_string()),
            requires_confirmation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_range() {
        assert!(Coordinate::new(0, 0).is_some());
        assert!(Coordinate::new(1000, 1000).is_some());
        assert!(Coordinate::new(-1, 500).is_none());
        assert!(Coordinate::new(500, 1001).is_none());
    }

    #[test]
    fn test_to_absolute_center() {
        let c = Coordinate::new(500, 500).unwrap();
        assert_eq!(c.to_absolute(1080, 1920), (540, 960));
    }

    #[test]
    fn test_to_absolute_stays_on_screen() {
        let c = Coordinate::new(1000, 1000).unwrap();
        assert_eq!(c.to_absolute(1080, 1920), (1079, 1919));

        for x in (0..=1000).step_by(37) {
            let (ax, ay) = Coordinate::new(x, 1000 - x).unwrap().to_absolute(720, 1600);
            assert!(ax < 720);
            assert!(ay < 1600);
        }
    }

    #[test]
    fn test_action_name_aliases() {
        assert_eq!(ActionName::from_wire("Double Tap"), ActionName::DoubleTap);
        assert_eq!(ActionName::from_wire("DoubleTap"), ActionName::DoubleTap);
        assert_eq!(ActionName::from_wire("Take_over"), ActionName::TakeOver);
        assert_eq!(ActionName::from_wire("CallApi"), ActionName::CallApi);
        assert_eq!(
            ActionName::from_wire("Teleport"),
            ActionName::Unknown("Teleport".to_string())
        );
        assert_eq!(ActionName::LongPress.as_wire(), "Long Press");
    }

    #[test]
    fn test_action_serializes_with_metadata() {
        let action = Action::tap(Coordinate::new(100, 200).unwrap());
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["_metadata"], "do");
        assert_eq!(value["element"], serde_json::json!([100, 200]));

        let finish = serde_json::to_value(Action::finish("done")).unwrap();
        assert_eq!(finish["_metadata"], "finish");
        assert_eq!(finish["message"], "done");
    }

    #[test]
    fn test_action_result() {
        let success = ActionResult::success();
        assert!(success.success);
        assert!(!success.should_finish);

        let finish = ActionResult::finish(Some("Done".to_string()));
        assert!(finish.success);
        assert!(finish.should_finish);

        let declined = ActionResult::declined();
        assert!(!declined.success);
        assert!(declined.should_finish);
        assert!(declined.requires_confirmation);
    }
}
