//! Balance and movement types shared by the state and the API client

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Coerces a wire amount into a finite `f64`.
///
/// Accepts JSON numbers and strings that start with a number, so `"12abc"`
/// reads as `12`. Anything else (null, missing, garbage, NaN, infinities)
/// becomes `0.0`.
pub fn lenient_amount(value: &serde_json::Value) -> f64 {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => leading_number(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Parses the longest decimal prefix of `s` after leading whitespace.
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s[..end].parse().ok()
}

fn deserialize_lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map_or(0.0, lenient_amount))
}

/// Net balance with its income and expense totals for the selected date.
///
/// `balance == income - expense` is expected but never re-derived locally;
/// the server value is trusted and local mutations only apply deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    #[serde(rename = "saldo", default, deserialize_with = "deserialize_lenient_amount")]
    pub balance: f64,
    #[serde(rename = "receita", default, deserialize_with = "deserialize_lenient_amount")]
    pub income: f64,
    #[serde(rename = "despesa", default, deserialize_with = "deserialize_lenient_amount")]
    pub expense: f64,
}

impl BalanceSnapshot {
    pub fn new(balance: f64, income: f64, expense: f64) -> Self {
        Self {
            balance,
            income,
            expense,
        }
    }

    /// Applies a movement of magnitude `value`.
    pub fn apply(&mut self, kind: MovementType, value: f64) {
        match kind {
            MovementType::Income => {
                self.balance += value;
                self.income += value;
            }
            MovementType::Expense => {
                self.balance -= value;
                self.expense += value;
            }
        }
    }

    /// Exact inverse of [`BalanceSnapshot::apply`].
    pub fn revert(&mut self, kind: MovementType, value: f64) {
        match kind {
            MovementType::Income => {
                self.balance -= value;
                self.income -= value;
            }
            MovementType::Expense => {
                self.balance += value;
                self.expense -= value;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "receita")]
    Income,
    #[serde(rename = "despesa")]
    Expense,
}

impl Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MovementType::Income => "receita",
                MovementType::Expense => "despesa",
            }
        )
    }
}

impl FromStr for MovementType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "receita" | "income" => Ok(MovementType::Income),
            "despesa" | "expense" => Ok(MovementType::Expense),
            _ => Err(anyhow::anyhow!("Invalid movement type: {}", s)),
        }
    }
}

/// Server-assigned identifier for movements and users.
///
/// The API is not consistent about ids being strings or numbers, so both are
/// accepted and held as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => RecordId(s),
            RawId::Number(n) => RecordId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: RecordId,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: MovementType,
    #[serde(default)]
    pub date: String,
}

/// A movement ready to be submitted, checked before any request is made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMovement {
    pub description: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: MovementType,
    pub date: String,
}

impl NewMovement {
    /// Validates raw form input. `date` is stamped with the current time.
    pub fn parse(value: &str, description: &str, kind: MovementType) -> Result<Self, String> {
        let value = value.trim();
        if value.is_empty() {
            return Err("Fill in the value correctly.".to_string());
        }
        let value = match value.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => return Err("Fill in the value correctly.".to_string()),
        };

        let description = description.trim();
        if description.is_empty() {
            return Err("Fill in the description.".to_string());
        }

        Ok(Self {
            description: description.to_string(),
            value,
            kind,
            date: chrono::Utc::now().to_rfc3339(),
        })
    }
}
