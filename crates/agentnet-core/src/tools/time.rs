//! Current time tool

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;

use super::{ToolHandler, json_schema};

const TIME_FORMAT: &str = "%a %b %e %H:%M:%S %:z %Y";

/// Reports the current time, optionally shifted to a fixed UTC offset
pub struct CurrentTimeTool;

fn format_at(now: DateTime<Utc>, offset_hours: Option<f64>) -> Result<String> {
    match offset_hours {
        None => Ok(now.format(TIME_FORMAT).to_string()),
        Some(hours) => {
            if !(-12.0..=14.0).contains(&hours) {
                return Err(anyhow!("utc_offset_hours must be between -12 and 14"));
            }
            let seconds = (hours * 3600.0).round() as i32;
            let offset = FixedOffset::east_opt(seconds)
                .ok_or_else(|| anyhow!("Invalid UTC offset: {}", hours))?;
            Ok(now.with_timezone(&offset).format(TIME_FORMAT).to_string())
        }
    }
}

#[async_trait]
impl ToolHandler for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current time. Without arguments returns UTC; pass utc_offset_hours \
         (e.g. -5, 5.5, 8) for a local time."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "utc_offset_hours": {
                    "type": "number",
                    "description": "Offset from UTC in hours, between -12 and 14"
                }
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let offset = match input.get("utc_offset_hours") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_f64()
                    .ok_or_else(|| anyhow!("utc_offset_hours must be a number"))?,
            ),
        };
        format_at(Utc::now(), offset)
    }
}
