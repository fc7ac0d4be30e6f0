//! 通用工具函数

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// HL7 MSH-10 控制ID的最大长度
pub const MAX_CONTROL_ID_LEN: usize = 20;

/// 生成唯一的HL7消息控制ID (MSH-10)
pub fn generate_control_id() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(MAX_CONTROL_ID_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// 格式化为HL7时间戳 (YYYYMMDDHHMMSS)
pub fn format_hl7_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%d%H%M%S").to_string()
}

/// 当前时间的HL7时间戳
pub fn hl7_timestamp_now() -> String {
    format_hl7_timestamp(&Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generate_control_id() {
        let id = generate_control_id();
        assert_eq!(id.len(), MAX_CONTROL_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_control_id());
    }

    #[test]
    fn test_format_hl7_timestamp() {
        let time = Utc.with_ymd_and_hms(2024, 12, 15, 14, 30, 0).unwrap();
        assert_eq!(format_hl7_timestamp(&time), "20241215143000");
        assert_eq!(hl7_timestamp_now().len(), 14);
    }
}
