use clap::{App, Arg};
use colored::*;
use metbus::{LinkReader, SeriesStore, Settings, StoreReader};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::warn;

const DEFAULT_POLL_INTERVAL: &str = "2";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("metmon")
        .version("0.1.0")
        .author("Environmental Telemetry Team")
        .about("🌦️  Weather station bus monitor - polls the telemetry ingestion core")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON settings file (link parameters and station catalog)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("DEVICE")
                .help("Serial device path")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("baud")
                .short("b")
                .long("baud")
                .value_name("BAUD")
                .help("Serial baud rate")
                .takes_value(true)
                .validator(|v| match v.parse::<u32>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Baud rate must be a valid number".into()),
                }),
        )
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval")
                .value_name("SECONDS")
                .help("Poll interval")
                .takes_value(true)
                .default_value(DEFAULT_POLL_INTERVAL)
                .validator(|v| match v.parse::<u64>() {
                    Ok(0) | Err(_) => Err("Interval must be a positive number".into()),
                    Ok(_) => Ok(()),
                }),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["table", "json", "compact"])
                .default_value("table"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output"),
        )
        .get_matches();

    if matches.is_present("verbose") {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let mut settings = match matches.value_of("config") {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(port) = matches.value_of("port") {
        settings.link.port = port.to_string();
    }
    if let Some(baud) = matches.value_of("baud") {
        settings.link.baud_rate = baud.parse()?;
    }

    let interval_secs: u64 = matches
        .value_of("interval")
        .unwrap_or(DEFAULT_POLL_INTERVAL)
        .parse()?;
    let format = matches.value_of("format").unwrap_or("table").to_string();

    println!("{}", "🌦️  Weather Station Bus Monitor".bright_blue().bold());
    println!("{} {} @ {} baud", "Link:".dimmed(), settings.link.port, settings.link.baud_rate);
    println!(
        "{} {} stations, reference '{}'",
        "Catalog:".dimmed(),
        settings.catalog.station_count(),
        settings.catalog.reference_station()
    );

    let catalog = Arc::new(settings.catalog.clone());
    let store = Arc::new(SeriesStore::new(&catalog));
    let mut reader = LinkReader::start(&settings.link, Arc::clone(&catalog), Arc::clone(&store))?;
    let query = StoreReader::new(store, catalog);

    println!("{} Polling every {}s (Press Ctrl+C to stop)", "📡".bright_blue(), interval_secs);

    let mut ticker = time::interval(Duration::from_secs(interval_secs));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match format.as_str() {
                    "json" => render_json(&query),
                    "compact" => render_compact(&query),
                    _ => render_table(&query),
                }

                if !reader.is_streaming() {
                    warn!(state = %reader.state(), "link reader is not streaming; displayed data may be stale");
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    reader.stop();

    let stats = reader.stats();
    println!();
    println!(
        "{} lines={} readings={} values={} short={} untimed={}",
        "📊 Ingest:".bright_white().bold(),
        stats.lines_read,
        stats.readings_decoded,
        stats.values_stored,
        stats.short_readings,
        stats.untimed_readings
    );
    println!("{}", "🛑 Monitor stopped".bright_green());

    Ok(())
}

fn render_table(query: &StoreReader) {
    println!();
    println!("{}", "📡 Latest Station Readings".bright_blue().bold());
    println!("{}", "══════════════════════════".bright_blue());

    for station in query.catalog().stations() {
        println!("{}", station.name.bright_white().bold());
        for variable in &station.variables {
            let unit = query.catalog().unit(variable);
            match query.latest(&station.name, variable) {
                Some(point) => println!(
                    "  {:<18} {} {} {}",
                    variable,
                    point.value.to_string().bright_cyan(),
                    unit,
                    point
                        .timestamp
                        .format("%H:%M:%S")
                        .to_string()
                        .dimmed()
                ),
                None => println!("  {:<18} {} {}", variable, "N/A".dimmed(), unit),
            }
        }
    }
}

fn render_compact(query: &StoreReader) {
    for station in query.catalog().stations() {
        let mut parts = Vec::new();
        for variable in &station.variables {
            if let Some(point) = query.latest(&station.name, variable) {
                parts.push(format!(
                    "{}={}{}",
                    variable,
                    point.value,
                    query.catalog().unit(variable)
                ));
            }
        }
        if !parts.is_empty() {
            println!("{} {}", format!("{}:", station.name).bright_white(), parts.join(" "));
        }
    }
}

fn render_json(query: &StoreReader) {
    let mut doc = serde_json::Map::new();

    for station in query.catalog().stations() {
        let mut series = serde_json::Map::new();
        for variable in &station.variables {
            let entry = match query.latest(&station.name, variable) {
                Some(point) => serde_json::json!({
                    "value": point.value,
                    "unit": query.catalog().unit(variable),
                    "timestamp": point.timestamp.format("%H:%M:%S").to_string(),
                }),
                None => serde_json::Value::Null,
            };
            series.insert(variable.clone(), entry);
        }
        doc.insert(station.name.clone(), serde_json::Value::Object(series));
    }

    println!("{}", serde_json::Value::Object(doc));
}
