//! Alert message templates
//!
//! Carries the guardian-facing message catalog. Messages are Korean, matching
//! the deployment locale of the band fleet.

/// SMS length limit (characters)
pub const MAX_SMS_LENGTH: usize = 90;

/// LMS length limit (characters)
pub const MAX_LMS_LENGTH: usize = 2000;

/// Guardian alert template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertTemplate {
    FallDetected,
    SosButton,
    HrHigh,
    HrLow,
    Spo2Low,
    BatteryLow,
    DeviceOffline,
    StimComplete,
    StimError,
    StimulatorDisconnected,
    Plain,
}

/// Variables substituted into a template
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    /// Wearer's display name
    pub name: String,
    /// Numeric reading that triggered the alert (bpm, %, minutes)
    pub value: Option<String>,
    /// Human-readable location
    pub location: Option<String>,
    /// Free-form body for `AlertTemplate::Plain`
    pub message: Option<String>,
}

impl TemplateVars {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: impl ToString) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl AlertTemplate {
    /// Render the template with the given variables.
    ///
    /// Missing variables render as empty strings, never as an error; a
    /// degraded alert still beats a dropped one.
    pub fn render(&self, vars: &TemplateVars) -> String {
        let name = vars.name.as_str();
        let value = vars.value.as_deref().unwrap_or("");
        let location = vars.location.as_deref().unwrap_or("");
        let message = vars.message.as_deref().unwrap_or("");

        match self {
            AlertTemplate::FallDetected => {
                format!("[긴급] {name}님 낙상이 감지되었습니다. 위치: {location}")
            }
            AlertTemplate::SosButton => {
                format!("[긴급] {name}님이 SOS 버튼을 눌렀습니다. 위치: {location}")
            }
            AlertTemplate::HrHigh => {
                format!("[주의] {name}님 심박수가 높습니다 ({value}bpm). 확인이 필요합니다.")
            }
            AlertTemplate::HrLow => {
                format!("[주의] {name}님 심박수가 낮습니다 ({value}bpm). 확인이 필요합니다.")
            }
            AlertTemplate::Spo2Low => {
                format!("[주의] {name}님 산소포화도가 저하되었습니다 ({value}%). 확인이 필요합니다.")
            }
            AlertTemplate::BatteryLow => {
                format!("[알림] {name}님 밴드 배터리가 부족합니다 ({value}%). 충전이 필요합니다.")
            }
            AlertTemplate::DeviceOffline => {
                format!("[알림] {name}님 밴드 연결이 끊겼습니다. 확인이 필요합니다.")
            }
            AlertTemplate::StimComplete => {
                format!("[알림] {name}님 신경자극 세션이 완료되었습니다. 총 {value}분 진행.")
            }
            AlertTemplate::StimError => {
                format!("[주의] {name}님 신경자극 중 오류가 발생했습니다. 확인이 필요합니다.")
            }
            AlertTemplate::StimulatorDisconnected => {
                format!("[알림] {name}님 신경자극기 연결이 해제되었습니다.")
            }
            AlertTemplate::Plain => format!("[Vitalink] {message}"),
        }
    }
}

/// Truncate a message to `max_length` characters, appending an ellipsis
pub fn truncate_message(message: &str, max_length: usize) -> String {
    let count = message.chars().count();
    if count <= max_length {
        return message.to_string();
    }
    let keep = max_length.saturating_sub(3);
    let truncated: String = message.chars().take(keep).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_value() {
        let msg = AlertTemplate::HrHigh.render(&TemplateVars::named("홍길동").with_value(135));
        assert!(msg.contains("홍길동"));
        assert!(msg.contains("135bpm"));
        assert!(msg.starts_with("[주의]"));
    }

    #[test]
    fn test_render_with_location() {
        let msg = AlertTemplate::FallDetected
            .render(&TemplateVars::named("홍길동").with_location("서울시 강남구"));
        assert!(msg.contains("서울시 강남구"));
        assert!(msg.starts_with("[긴급]"));
    }

    #[test]
    fn test_render_missing_vars_degrades() {
        let msg = AlertTemplate::Spo2Low.render(&TemplateVars::named("홍길동"));
        assert!(msg.contains("(%)"));
    }

    #[test]
    fn test_render_plain() {
        let msg = AlertTemplate::Plain
            .render(&TemplateVars::default().with_message("점검 안내"));
        assert_eq!(msg, "[Vitalink] 점검 안내");
    }

    #[test]
    fn test_truncate_short_message_unchanged() {
        assert_eq!(truncate_message("short", 90), "short");
    }

    #[test]
    fn test_truncate_long_message() {
        let long: String = "가".repeat(100);
        let truncated = truncate_message(&long, 90);
        assert_eq!(truncated.chars().count(), 90);
        assert!(truncated.ends_with("..."));
    }
}
