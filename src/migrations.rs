use clickhouse::Client;

/// Ordered list of DDL statements for the MAUDE event store. Every statement
/// is idempotent (`IF NOT EXISTS`) so safe to run on every startup. The core
/// is read-only against this schema — the ingestion pipeline (an external
/// collaborator) is responsible for populating it.
const MIGRATIONS: &[&str] = &[
    "CREATE DATABASE IF NOT EXISTS maude",
    r"CREATE TABLE IF NOT EXISTS maude.master_events
(
    mdr_report_key     String,
    date_received       Date,
    date_of_event       Nullable(Date),
    event_type          LowCardinality(String),
    manufacturer_name   String,
    manufacturer_clean  LowCardinality(String),
    product_code        LowCardinality(String),
    received_year       UInt16 MATERIALIZED toYear(date_received),
    received_month      UInt8 MATERIALIZED toMonth(date_received),
    INDEX idx_product_code product_code TYPE bloom_filter(0.01) GRANULARITY 1,
    INDEX idx_manufacturer_clean manufacturer_clean TYPE bloom_filter(0.01) GRANULARITY 1
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(date_received)
ORDER BY (manufacturer_clean, product_code, date_received, mdr_report_key)
SETTINGS index_granularity = 8192",

    r"CREATE TABLE IF NOT EXISTS maude.devices
(
    mdr_report_key          String,
    brand_name              String,
    generic_name            String,
    model_number            String,
    manufacturer_d_clean    LowCardinality(String),
    device_report_product_code LowCardinality(String),
    implant_flag            UInt8,
    INDEX idx_brand_name brand_name TYPE bloom_filter(0.01) GRANULARITY 1,
    INDEX idx_generic_name generic_name TYPE bloom_filter(0.01) GRANULARITY 1
)
ENGINE = MergeTree
ORDER BY (mdr_report_key, brand_name)
SETTINGS index_granularity = 8192",

    // The ingestion pipeline is an external collaborator and populates
    // these tables; declared here so joins against patient demographics
    // and narrative text, if ever added downstream, have a stable target.
    r"CREATE TABLE IF NOT EXISTS maude.patients
(
    mdr_report_key      String,
    patient_age_numeric  Nullable(Float64),
    patient_sex          LowCardinality(String)
)
ENGINE = MergeTree
ORDER BY mdr_report_key",

    r"CREATE TABLE IF NOT EXISTS maude.mdr_text
(
    mdr_report_key  String,
    text_type       LowCardinality(String),
    narrative       String
)
ENGINE = MergeTree
ORDER BY mdr_report_key",
];

pub async fn run(url: &str, user: &str, password: &str) -> anyhow::Result<()> {
    let client = Client::default()
        .with_url(url)
        .with_user(user)
        .with_password(password);

    tracing::info!("running clickhouse migrations ({} statements)", MIGRATIONS.len());

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let preview: String = sql.chars().take(80).collect();
        tracing::debug!("migration {}/{}: {}...", i + 1, MIGRATIONS.len(), preview);
        client.query(sql).execute().await.map_err(|e| {
            tracing::error!("migration {}/{} failed: {e}", i + 1, MIGRATIONS.len());
            e
        })?;
    }

    tracing::info!("clickhouse migrations complete");
    Ok(())
}
