//! CLI & process boundary: argument parsing, value normalization and range
//! checking, logging setup, and exit-code translation.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, ValueEnum};

use crate::action::{Action, RequestParams};
use crate::cache::WpuCache;
use crate::datatype;
use crate::decode;
use crate::engine::{Mode, TransactionEngine};
use crate::error::WpuError;
use crate::export::{InfluxDbSink, MeasurementSink};
use crate::i2c_link::I2cRawLink;
use crate::schema::SchemaStore;
#[cfg(not(feature = "hardware"))]
use crate::slave::FakeSlaveEndpoint;

#[cfg(feature = "hardware")]
use crate::slave::PigpioSlaveEndpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ActionArg {
    Getnodeid,
    Getserial,
    Getdatatype,
    Getdatalog,
    Getcounters,
    Getsetting,
    Setsetting,
    Getsettings,
    Getmanual,
    Setmanual,
}

/// Itho WPU I2C master/slave controller.
#[derive(Debug, Parser)]
#[command(name = "itho-wpu", max_term_width = 80)]
pub struct Args {
    /// Action to execute.
    #[arg(long, value_enum)]
    pub action: ActionArg,

    /// Setting/manual id; required for getsetting, setsetting, getmanual, setmanual.
    #[arg(long)]
    pub id: Option<u16>,

    /// Decimal value to write; prompted for interactively if omitted on a write action.
    #[arg(long)]
    pub value: Option<String>,

    /// Clears the manual-override check byte.
    #[arg(long, default_value_t = false)]
    pub no_check: bool,

    /// I2C bus number.
    #[arg(long, default_value_t = 1)]
    pub bus: u8,

    /// Only run the I2C master half (diagnostic).
    #[arg(long, default_value_t = false)]
    pub master_only: bool,

    /// Only run the I2C slave half (diagnostic).
    #[arg(long, default_value_t = false)]
    pub slave_only: bool,

    /// Slave timeout in seconds when --slave-only.
    #[arg(long, default_value_t = 60)]
    pub slave_timeout: u64,

    /// Don't use the local cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Export decoded datalog measurements to InfluxDB.
    #[arg(long, default_value_t = false)]
    pub export_to_influxdb: bool,

    /// Log level.
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Show timestamps in log output.
    #[arg(long, default_value_t = false)]
    pub timestamp: bool,
}

impl Args {
    fn check(&self) -> bool {
        !self.no_check
    }
}

pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();
    let level = args
        .loglevel
        .as_deref()
        .map(|l| l.parse().unwrap_or(log::LevelFilter::Info))
        .unwrap_or(log::LevelFilter::Info);
    builder.filter_level(level);
    if !args.timestamp {
        builder.format_timestamp(None);
    }
    builder.init();
}

pub fn run(args: Args) -> Result<(), WpuError> {
    let mut cache = if args.no_cache {
        WpuCache::empty()
    } else {
        WpuCache::load("itho-wpu-cache.json")?
    };

    let mode = if args.master_only {
        Mode::MasterOnly
    } else if args.slave_only {
        Mode::SlaveOnly { slave_timeout: Duration::from_secs(args.slave_timeout) }
    } else {
        Mode::Normal
    };

    match args.action {
        ActionArg::Getnodeid => {
            if let Some(frame) = call(&args, mode, &mut cache, Action::GetNodeId, &RequestParams::default())? {
                let node = decode::decode_node_id(frame.payload())?;
                log::info!(
                    "ManufacturerGroup: {}, Manufacturer: {}, HardwareType: {}, ProductVersion: {}, ListVersion: {}",
                    node.manufacturer_group, node.manufacturer, node.hardware_type,
                    node.product_version, node.list_version
                );
            }
        }
        ActionArg::Getserial => {
            if let Some(frame) = call(&args, mode, &mut cache, Action::GetSerial, &RequestParams::default())? {
                let serial = decode::decode_serial(frame.payload())?;
                log::info!("Serial: {serial}");
            }
        }
        ActionArg::Getdatatype => {
            call(&args, mode, &mut cache, Action::GetDataType, &RequestParams::default())?;
        }
        ActionArg::Getdatalog => {
            run_getdatalog(&args, mode, &mut cache)?;
        }
        ActionArg::Getcounters => {
            run_getcounters(&args, mode, &mut cache)?;
        }
        ActionArg::Getsetting => {
            let id = require_id(&args)?;
            run_getsetting(&args, mode, &mut cache, id)?;
        }
        ActionArg::Setsetting => {
            let id = require_id(&args)?;
            run_setsetting(&args, mode, &mut cache, id)?;
        }
        ActionArg::Getsettings => {
            run_getsettings(&args, mode, &mut cache)?;
        }
        ActionArg::Getmanual => {
            let id = require_id(&args)?;
            run_getmanual(&args, mode, &mut cache, id)?;
        }
        ActionArg::Setmanual => {
            let id = require_id(&args)?;
            run_setmanual(&args, mode, &mut cache, id)?;
        }
    }

    Ok(())
}

fn require_id(args: &Args) -> Result<u16, WpuError> {
    args.id
        .ok_or_else(|| WpuError::UsageError(format!("--id is required for {:?}", args.action)))
}

/// Opens a fresh master link and slave endpoint, runs one engine call.
/// Each call owns a fresh cycle rather than reusing state across calls.
fn call(
    args: &Args,
    mode: Mode,
    cache: &mut WpuCache,
    action: Action,
    params: &RequestParams,
) -> Result<Option<crate::frame::Frame>, WpuError> {
    let mut master = I2cRawLink::open(args.bus, 0x41)?;

    #[cfg(feature = "hardware")]
    let mut slave = PigpioSlaveEndpoint::new("localhost");
    #[cfg(not(feature = "hardware"))]
    let mut slave = FakeSlaveEndpoint::new();

    let mut engine = TransactionEngine::new(mode, &mut master, &mut slave, cache, args.no_cache);
    engine.call(action, params)
}

fn resolve_list_version(args: &Args, mode: Mode, cache: &mut WpuCache) -> Result<u8, WpuError> {
    let frame = call(args, mode, cache, Action::GetNodeId, &RequestParams::default())?
        .ok_or_else(|| WpuError::UsageError("no response to getnodeid".to_string()))?;
    Ok(decode::decode_node_id(frame.payload())?.list_version)
}

fn run_getdatalog(args: &Args, mode: Mode, cache: &mut WpuCache) -> Result<(), WpuError> {
    let list_version = resolve_list_version(args, mode, cache)?;
    let datatype_frame = call(args, mode, cache, Action::GetDataType, &RequestParams::default())?
        .ok_or_else(|| WpuError::UsageError("no response to getdatatype".to_string()))?;

    let Some(datalog_frame) = call(args, mode, cache, Action::GetDataLog, &RequestParams::default())? else {
        return Ok(());
    };

    let store = SchemaStore::open("heatpump.sqlite")?;
    let fields = decode::resolve_datalog_fields(&store, list_version, datatype_frame.raw())?;
    let measurements = decode::decode_datalog(&fields, datalog_frame.payload());
    print_measurements(&measurements);

    if args.export_to_influxdb {
        let sink = InfluxDbSink::from_env();
        sink.write("getdatalog", Utc::now(), &measurements)?;
    }

    Ok(())
}

fn run_getcounters(args: &Args, mode: Mode, cache: &mut WpuCache) -> Result<(), WpuError> {
    let list_version = resolve_list_version(args, mode, cache)?;
    let Some(frame) = call(args, mode, cache, Action::GetCounters, &RequestParams::default())? else {
        return Ok(());
    };

    let store = SchemaStore::open("heatpump.sqlite")?;
    let versions = store.resolve_versions(list_version)?;
    let rows = store.counters(versions.counters)?;
    let measurements = decode::decode_counters(&rows, frame.payload());
    for row in &rows {
        let Some(value) = measurements.get(&row.name.to_lowercase()) else {
            continue;
        };
        match &row.unit {
            Some(unit) => log::info!("{} ({}): {value} {unit}", row.title, row.name),
            None => log::info!("{} ({}): {value}", row.title, row.name),
        }
        if let Some(tooltip) = &row.tooltip {
            log::debug!("{}: {tooltip}", row.name);
        }
    }
    Ok(())
}

fn run_getsetting(args: &Args, mode: Mode, cache: &mut WpuCache, id: u16) -> Result<(), WpuError> {
    let list_version = resolve_list_version(args, mode, cache)?;
    let store = SchemaStore::open("heatpump.sqlite")?;
    let versions = store.resolve_versions(list_version)?;
    let row = store.setting_by_id(versions.parameterlijst, id as u32)?;

    let params = RequestParams { id: Some(id), ..Default::default() };
    let Some(frame) = call(args, mode, cache, Action::GetSetting, &params)? else {
        return Ok(());
    };
    let setting = decode::decode_setting_response(frame.payload())?;
    let unit = row.unit.as_deref().unwrap_or("");
    log::info!(
        "{} ({}): current: {}{unit}, min: {}{unit}, max: {}{unit}, step: {}{unit}, factory default: {}{unit}",
        row.title, row.name, setting.current, setting.min, setting.max, setting.step, row.default
    );
    if let Some(description) = &row.description {
        log::info!("{}: {description}", row.name);
    }
    Ok(())
}

fn run_getsettings(args: &Args, mode: Mode, cache: &mut WpuCache) -> Result<(), WpuError> {
    let list_version = resolve_list_version(args, mode, cache)?;
    let store = SchemaStore::open("heatpump.sqlite")?;
    let versions = store.resolve_versions(list_version)?;
    for row in store.settings(versions.parameterlijst)? {
        let params = RequestParams { id: Some(row.id as u16), ..Default::default() };
        match call(args, mode, cache, Action::GetSetting, &params)? {
            Some(frame) => match decode::decode_setting_response(frame.payload()) {
                Ok(setting) => log::info!("{} ({}): {}", row.title, row.name, setting.current),
                Err(e) => log::error!("{} ({}): {e}", row.title, row.name),
            },
            None => log::warn!("{} ({}): no response", row.title, row.name),
        }
    }
    Ok(())
}

fn run_getmanual(args: &Args, mode: Mode, cache: &mut WpuCache, id: u16) -> Result<(), WpuError> {
    let list_version = resolve_list_version(args, mode, cache)?;
    let store = SchemaStore::open("heatpump.sqlite")?;
    let versions = store.resolve_versions(list_version)?;
    let row = store.manual_by_id(versions.handbed, id as u32)?;

    let params = RequestParams { id: Some(id), ..Default::default() };
    let Some(frame) = call(args, mode, cache, Action::GetManual, &params)? else {
        return Ok(());
    };
    let manual = decode::decode_manual_response(frame.payload())?;
    let unit = row.unit.as_deref().unwrap_or("");
    log::info!(
        "{} ({}): value: {}{unit} (id: {}, datatype: {:#04x}, range: {}..{}{unit}, factory default: {}{unit})",
        row.title, row.name, manual.value, row.id, manual.datatype, row.min, row.max, row.default
    );
    if let Some(tooltip) = &row.tooltip {
        log::debug!("{}: {tooltip}", row.name);
    }
    Ok(())
}

fn run_setsetting(args: &Args, mode: Mode, cache: &mut WpuCache, id: u16) -> Result<(), WpuError> {
    let store = SchemaStore::open("heatpump.sqlite")?;
    let list_version = resolve_list_version(args, mode, cache)?;
    let versions = store.resolve_versions(list_version)?;
    let row = store.setting_by_id(versions.parameterlijst, id as u32)?;

    let decimal = require_value(args)?;
    // Settings don't carry their own datatype in the schema row; it comes
    // from a getsetting response. Fetch it first.
    let probe = call(args, mode, cache, Action::GetSetting, &RequestParams { id: Some(id), ..Default::default() })?
        .ok_or_else(|| WpuError::UsageError("no response to getsetting probe".to_string()))?;
    let current = decode::decode_setting_response(probe.payload())?;

    let normalized = normalize_decimal(&decimal, current.datatype)?;
    let value_as_decimal = normalized as f64 / datatype::scale_factor(current.datatype)? as f64;
    if value_as_decimal < row.min || value_as_decimal > row.max {
        return Err(WpuError::ValueOutOfRange {
            value: normalized as i64,
            min: row.min as i64,
            max: row.max as i64,
        });
    }

    if !confirm()? {
        log::error!("aborted");
        return Ok(());
    }

    let params = RequestParams { id: Some(id), value: Some(normalized), ..Default::default() };
    call(args, mode, cache, Action::SetSetting, &params)?;
    Ok(())
}

fn run_setmanual(args: &Args, mode: Mode, cache: &mut WpuCache, id: u16) -> Result<(), WpuError> {
    let store = SchemaStore::open("heatpump.sqlite")?;
    let list_version = resolve_list_version(args, mode, cache)?;
    let versions = store.resolve_versions(list_version)?;
    let row = store.manual_by_id(versions.handbed, id as u32)?;

    let decimal = require_value(args)?;
    let probe = call(args, mode, cache, Action::GetManual, &RequestParams { id: Some(id), ..Default::default() })?
        .ok_or_else(|| WpuError::UsageError("no response to getmanual probe".to_string()))?;
    let current = decode::decode_manual_response(probe.payload())?;

    let normalized = normalize_decimal(&decimal, current.datatype)?;
    let value_as_decimal = normalized as f64 / datatype::scale_factor(current.datatype)? as f64;
    if value_as_decimal < row.min || value_as_decimal > row.max {
        return Err(WpuError::ValueOutOfRange {
            value: normalized as i64,
            min: row.min as i64,
            max: row.max as i64,
        });
    }

    if !confirm()? {
        log::error!("aborted");
        return Ok(());
    }

    let params = RequestParams {
        id: Some(id),
        datatype: Some(current.datatype),
        value: Some(normalized),
        check: args.check(),
    };
    call(args, mode, cache, Action::SetManual, &params)?;
    Ok(())
}

fn require_value(args: &Args) -> Result<String, WpuError> {
    match &args.value {
        Some(v) => Ok(v.clone()),
        None => {
            print!("Enter value: ");
            io::stdout().flush().ok();
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line.trim().to_string())
        }
    }
}

/// Parses a nonnegative decimal string and scales it by `dt`'s scale
/// factor to reach the normalized integer the codec expects.
/// Negative values are explicitly unsupported.
fn normalize_decimal(decimal: &str, dt: u8) -> Result<u32, WpuError> {
    if decimal.starts_with('-') {
        return Err(WpuError::UsageError(
            "negative values are not supported".to_string(),
        ));
    }
    let scale = datatype::scale_factor(dt)?;
    let parsed: f64 = decimal
        .parse()
        .map_err(|_| WpuError::UsageError(format!("not a decimal: {decimal}")))?;
    Ok((parsed * scale as f64).round() as u32)
}

/// The "YES"-typed confirmation gate required before a write proceeds.
fn confirm() -> Result<bool, WpuError> {
    print!("Are you really sure? (Type uppercase yes): ");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim() == "YES")
}

fn print_measurements(measurements: &BTreeMap<String, f64>) {
    for (k, v) in measurements {
        println!("{k}: {v}");
    }
}
