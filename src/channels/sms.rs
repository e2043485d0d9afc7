use std::time::Duration;

use tracing::{debug, info, warn};

use crate::models::{Alert, User};
use crate::twilio::TwilioClient;

/// Submit attempts per alert, counting the first one.
const SEND_ATTEMPTS: u32 = 3;
/// Fixed delay between submit attempts.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Primary notification sink: one SMS per alert via Twilio.
///
/// Disabled (all sends return `false`) when the Twilio triad was not
/// configured or client construction failed. Nothing here panics or
/// propagates errors.
pub struct SmsChannel {
    client: Option<TwilioClient>,
}

impl SmsChannel {
    pub fn new(client: Option<TwilioClient>) -> Self {
        if client.is_none() {
            info!("SMS channel disabled (Twilio not configured)");
        }
        Self { client }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Send one alert to `user`. Returns `true` on the first successful
    /// submit; `false` when disabled, when the user has no phone number, or
    /// after all attempts are exhausted.
    pub async fn send_alert(&self, alert: &Alert, user: &User) -> bool {
        let Some(client) = &self.client else {
            debug!(alert_id = %alert.alert_id, "SMS disabled, skipping");
            return false;
        };
        let Some(phone) = user.phone_number.as_deref().filter(|p| !p.is_empty()) else {
            info!(user_id = user.id, alert_id = %alert.alert_id, "User has no phone number, skipping SMS");
            return false;
        };

        let body = format_message(alert);
        for attempt in 1..=SEND_ATTEMPTS {
            match client.send_message(phone, &body).await {
                Ok(()) => {
                    info!(alert_id = %alert.alert_id, user_id = user.id, attempt, "SMS sent");
                    return true;
                }
                Err(e) => {
                    warn!(alert_id = %alert.alert_id, attempt, error = %e, "SMS submit failed");
                    if attempt < SEND_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        false
    }
}

/// Render the alert as the outbound message body. Values carry their units
/// and are rounded to one decimal; plant names fall back to plant types when
/// no names are known.
pub(crate) fn format_message(alert: &Alert) -> String {
    let unit = alert.alert_type.unit();
    let plants = if alert.affected_plant_names.is_empty() {
        alert.affected_plant_types.join(", ")
    } else {
        alert.affected_plant_names.join(", ")
    };
    format!(
        "Weather alert for {name}\n{label}: {value:.1}{unit} (threshold {threshold:.1}{unit})\nAffected plants: {plants}",
        name = alert.garden_name,
        label = alert.alert_type.label(),
        value = alert.current_value,
        threshold = alert.threshold,
    )
}
