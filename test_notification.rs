use chrono::Utc;
use vip_leads::notifier::Notifier;
use vip_leads::{Application, ApplicationStatus, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/vip-leads.yaml".to_string());
    println!("🧪 Sending test notification using {path}");

    let mut config = Config::from_file(&path)?;
    for problem in config.apply_env_overrides() {
        log::warn!("{problem}");
    }

    let notifier = Notifier::from_config(&config);
    if notifier.channel_names().is_empty() {
        println!("❌ No notification channels are configured");
        return Ok(());
    }

    let sample = Application {
        id: 0,
        name: "Тестовая заявка".to_string(),
        phone: "+79000000000".to_string(),
        email: Some("test@example.com".to_string()),
        service_type: Some("other".to_string()),
        message: Some("Проверка уведомлений".to_string()),
        ip_address: "127.0.0.1".to_string(),
        created_at: Utc::now(),
        status: ApplicationStatus::New,
    };

    let report = notifier.notify(&sample).await;
    for (channel, delivery) in &report.deliveries {
        println!("   {channel}: {delivery:?}");
    }
    println!("✅ {} sent, {} failed", report.sent(), report.failed());

    Ok(())
}
