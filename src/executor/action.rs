//! Validation boundary for the model's action reply.
//!
//! The model answers with loosely-typed JSON. Every field is untrusted: a
//! slot may come back as `3`, `"3"`, `3.0`, `null`, `-1` or `"banana"`.
//! [`validate`] folds all of that into a single [`ActionOutcome`], so no
//! caller ever compares against sentinels itself.
use std::fmt;
use std::num::IntErrorKind;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GeometryConfig;

/// Action record exactly as the model produced it. No invariants hold here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub card_slot: Option<Value>,
    #[serde(default)]
    pub grid_x: Option<Value>,
    #[serde(default)]
    pub grid_y: Option<Value>,
}

/// A card play that passed every range check against the active geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedAction {
    card_slot: u8,
    grid_x: u32,
    grid_y: u32,
}

impl ValidatedAction {
    /// Range-checks already-coerced integers against `geometry`.
    pub fn new(
        card_slot: i64,
        grid_x: i64,
        grid_y: i64,
        geometry: &GeometryConfig,
    ) -> Result<Self, NoOp> {
        check_range(
            ActionField::CardSlot,
            card_slot,
            i64::from(GeometryConfig::MIN_SLOT),
            i64::from(GeometryConfig::MAX_SLOT),
        )?;
        check_range(
            ActionField::GridX,
            grid_x,
            0,
            i64::from(geometry.board_cols) - 1,
        )?;
        check_range(
            ActionField::GridY,
            grid_y,
            0,
            i64::from(geometry.board_rows) - 1,
        )?;

        // Ranges were checked above, so the narrowing casts are lossless.
        let slot = card_slot as u8;
        if geometry.card_slot(slot).is_none() {
            return Err(NoOp::UnknownSlot { slot });
        }

        Ok(Self {
            card_slot: slot,
            grid_x: grid_x as u32,
            grid_y: grid_y as u32,
        })
    }

    pub fn card_slot(&self) -> u8 {
        self.card_slot
    }

    pub fn grid_x(&self) -> u32 {
        self.grid_x
    }

    pub fn grid_y(&self) -> u32 {
        self.grid_y
    }
}

fn check_range(field: ActionField, value: i64, min: i64, max: i64) -> Result<(), NoOp> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(NoOp::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionField {
    CardSlot,
    GridX,
    GridY,
}

impl fmt::Display for ActionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionField::CardSlot => "card_slot",
            ActionField::GridX => "grid_x",
            ActionField::GridY => "grid_y",
        })
    }
}

/// Why a cycle ends without touching the pointer. Not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum NoOp {
    /// At least one of the three fields was missing, null or a sentinel.
    Declined { reasoning: Option<String> },
    /// The reply did not contain a parseable JSON object.
    Malformed { detail: String },
    NotNumeric { field: ActionField, value: String },
    OutOfRange {
        field: ActionField,
        value: i64,
        min: i64,
        max: i64,
    },
    UnknownSlot { slot: u8 },
}

impl fmt::Display for NoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoOp::Declined { reasoning: Some(r) } => write!(f, "model declined to act: {r}"),
            NoOp::Declined { reasoning: None } => f.write_str("model declined to act"),
            NoOp::Malformed { detail } => write!(f, "unparseable model reply: {detail}"),
            NoOp::NotNumeric { field, value } => {
                write!(f, "{field} is not an integer: {value}")
            }
            NoOp::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field} = {value} outside {min}..={max}"),
            NoOp::UnknownSlot { slot } => {
                write!(f, "card slot {slot} has no configured position")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Valid(ValidatedAction),
    NoOp(NoOp),
}

impl ActionOutcome {
    pub fn into_result(self) -> Result<ValidatedAction, NoOp> {
        match self {
            ActionOutcome::Valid(action) => Ok(action),
            ActionOutcome::NoOp(reason) => Err(reason),
        }
    }
}

/// Normalises an untrusted [`RawAction`] into a play or a no-op.
///
/// The three positional fields gate all-or-nothing: if any is absent the
/// whole record is a [`NoOp::Declined`], whatever the other two contain.
pub fn validate(raw: &RawAction, geometry: &GeometryConfig) -> ActionOutcome {
    let fields = [
        (ActionField::CardSlot, raw.card_slot.as_ref()),
        (ActionField::GridX, raw.grid_x.as_ref()),
        (ActionField::GridY, raw.grid_y.as_ref()),
    ];

    if fields.iter().any(|(_, value)| is_absent(*value)) {
        return ActionOutcome::NoOp(NoOp::Declined {
            reasoning: raw.reasoning.clone(),
        });
    }

    let mut coerced = [0i64; 3];
    for (slot, (field, value)) in coerced.iter_mut().zip(fields) {
        // is_absent already rejected None.
        let Some(value) = value else {
            return ActionOutcome::NoOp(NoOp::Declined {
                reasoning: raw.reasoning.clone(),
            });
        };
        match coerce_integer(value) {
            Some(n) => *slot = n,
            None => {
                return ActionOutcome::NoOp(NoOp::NotNumeric {
                    field,
                    value: value.to_string(),
                })
            }
        }
    }

    match ValidatedAction::new(coerced[0], coerced[1], coerced[2], geometry) {
        Ok(action) => ActionOutcome::Valid(action),
        Err(reason) => ActionOutcome::NoOp(reason),
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_i64() == Some(-1) || n.as_f64() == Some(-1.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s == "-1" || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("none")
        }
        Some(_) => false,
    }
}

/// Accepts integers, integral floats and integer-looking strings.
///
/// Integers too wide for `i64` saturate, so they fail the range check
/// instead of reading as non-numeric.
fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            if n.as_u64().is_some() {
                return Some(i64::MAX);
            }
            let f = n.as_f64()?;
            // `as` saturates for floats outside the i64 range.
            (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
        }
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => Some(i),
            Err(e) => match e.kind() {
                IntErrorKind::PosOverflow => Some(i64::MAX),
                IntErrorKind::NegOverflow => Some(i64::MIN),
                _ => None,
            },
        },
        _ => None,
    }
}

fn code_fence() -> Option<&'static regex::Regex> {
    static FENCE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| match regex::Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```") {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "code fence pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Extracts the first JSON object from a model reply, tolerating markdown
/// code fences and chatter on either side of it.
pub fn parse_action_response(text: &str) -> Result<RawAction, NoOp> {
    let unfenced = code_fence()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    let mut first_error = None;
    for (start, _) in unfenced.match_indices('{') {
        // Only the first value is read; whatever follows it is ignored.
        let mut values =
            serde_json::Deserializer::from_str(&unfenced[start..]).into_iter::<RawAction>();
        match values.next() {
            Some(Ok(raw)) => return Ok(raw),
            Some(Err(e)) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
            None => break,
        }
    }

    Err(NoOp::Malformed {
        detail: first_error
            .unwrap_or_else(|| format!("no JSON object in {:?}", truncate(unfenced, 120))),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
