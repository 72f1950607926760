//! Actions module for handling AI model outputs.

mod handler;
mod parser;
mod types;

pub use handler::{
    parse_duration, swipe_duration, wait_duration, ActionHandler, ConfirmationCallback,
    TakeoverCallback, DEFAULT_WAIT, LONG_PRESS_DURATION, MAX_SWIPE_DURATION, MAX_WAIT,
    MIN_SWIPE_DURATION,
};
pub use parser::{extract_action_call, parse_action, render_action, ParseError};
pub use types::{
    Action, ActionName, ActionParams, ActionResult, Coordinate, DoAction, Literal,
    RELATIVE_COORDINATE_MAX,
};
