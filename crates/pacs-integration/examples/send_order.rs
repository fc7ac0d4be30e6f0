//! 向HIS->RIS通道发送一条测试检查申请 (ORM^O01) 并打印ACK
//!
//! 运行: cargo run -p pacs-integration --example send_order -- 127.0.0.1:6661

use anyhow::{Context, Result};
use pacs_core::utils::{generate_control_id, hl7_timestamp_now};
use pacs_integration::{parse_message, validate_message, MllpConnection};
use std::time::Duration;
use tracing::{info, warn};

fn create_test_order() -> (String, String) {
    let timestamp = hl7_timestamp_now();
    let order_id = format!("ORD{}", timestamp);
    let message = [
        format!(
            "MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|{}||ORM^O01|{}|P|2.5",
            timestamp,
            generate_control_id()
        ),
        format!(
            "PID|1||TEST{ts}^^^HOSPITAL^MR||TESTPATIENT^JOHN^A||19850312|M|||123 TEST ST^RIYADH^RIYADH^12345^SA||(011)555-0123",
            ts = timestamp
        ),
        format!(
            "ORC|NW|{order_id}|REQ{ts}|GRP{ts}|SC||||{ts}|||DR.SMITH^JOHN^A",
            ts = timestamp
        ),
        format!(
            "OBR|1|{order_id}|REQ{ts}|PANO^Panoramic X-Ray^L|||{ts}|||||||||DR.JONES^MARY^B||||||||||1",
            ts = timestamp
        ),
    ]
    .join("\r");

    (message, order_id)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let target = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:6661".to_string());
    let (message, order_id) = create_test_order();

    let result = validate_message(&message);
    info!("Local validation: {}", result.get_summary());

    info!("Sending order {} to {}", order_id, target);
    let mut connection = MllpConnection::connect(target.as_str(), Duration::from_secs(5))
        .await
        .with_context(|| format!("Failed to connect to {}", target))?;

    let reply = connection
        .send_and_await_reply(&message, Duration::from_secs(10))
        .await
        .context("No acknowledgement received")?;
    let ack = reply.into_text()?;

    match parse_message(&ack) {
        Ok(parsed) => info!(
            "ACK {} for control id {}",
            parsed.field("MSA", 1).unwrap_or("?"),
            parsed.field("MSA", 2).unwrap_or("?")
        ),
        Err(e) => warn!("Reply is not a valid HL7 message: {}", e),
    }
    println!("{}", ack.replace('\r', "\n"));

    Ok(())
}
