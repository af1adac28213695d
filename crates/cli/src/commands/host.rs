//! `hostctl host`
//!
//! Rows are given as a flat JSON object. Strings in address columns are
//! parsed as IP addresses and passed on as raw inet bytes, the way they come
//! off the wire; everything else maps onto the closest column value.

use anyhow::{bail, Context};
use clap::Args;
use corelib::{Address, CoreConfig, Host, HostMetadata, HostWarning, MapRow, Value};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const ADDRESS_COLUMNS: &[&str] = &["rpc_address", "peer", "broadcast_address", "listen_address"];

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Identity address of the node, e.g. 10.0.0.1:9042.
    #[arg(long)]
    pub address: SocketAddr,
    /// JSON file holding one `system.local` / `system.peers` row.
    #[arg(long)]
    pub row: PathBuf,
    /// Copy the `tokens` column even if the config does not ask for it.
    #[arg(long)]
    pub use_tokens: bool,
}

#[derive(Debug, Serialize)]
pub struct HostReport {
    pub address: Address,
    pub connect_address: Address,
    pub metadata: HostMetadata,
    pub warnings: Vec<HostWarning>,
}

pub fn run(args: &HostArgs, core: &CoreConfig) -> anyhow::Result<HostReport> {
    let text = std::fs::read_to_string(&args.row)
        .with_context(|| format!("reading {}", args.row.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.row.display()))?;
    let row = row_from_json(&json)?;

    let host = Host::with_latency_settings(args.address.into(), &core.latency);
    let warnings = host.set(&row, args.use_tokens || core.use_tokens);

    Ok(HostReport {
        address: *host.address(),
        connect_address: host.connect_address(),
        metadata: host.metadata(),
        warnings,
    })
}

/// Build a row from a JSON object of column name to value.
pub fn row_from_json(json: &serde_json::Value) -> anyhow::Result<MapRow> {
    let Some(columns) = json.as_object() else {
        bail!("row must be a JSON object");
    };
    let mut row = MapRow::new();
    for (name, value) in columns {
        let is_address = ADDRESS_COLUMNS.contains(&name.as_str());
        row = row.with(name.clone(), to_value(value, is_address)?);
    }
    Ok(row)
}

fn to_value(json: &serde_json::Value, is_address: bool) -> anyhow::Result<Value> {
    use serde_json::Value as Json;

    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Int(i64::from(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Text(n.to_string()),
        },
        Json::String(s) if is_address => match s.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => Value::Inet(ip.octets().to_vec()),
            Ok(IpAddr::V6(ip)) => Value::Inet(ip.octets().to_vec()),
            Err(_) => Value::Text(s.clone()),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .map(|item| to_value(item, is_address))
                .collect::<anyhow::Result<_>>()?,
        ),
        Json::Object(_) => bail!("nested objects are not valid column values"),
    })
}

impl fmt::Display for HostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = &self.metadata;
        writeln!(f, "host            {}", self.address)?;
        writeln!(f, "rpc address     {}", meta.rpc_address)?;
        writeln!(f, "connect address {}", self.connect_address)?;
        writeln!(f, "data center     {:?} (id {})", meta.dc, meta.dc_id)?;
        writeln!(f, "rack            {:?} (id {})", meta.rack, meta.rack_id)?;
        writeln!(f, "partitioner     {:?}", meta.partitioner)?;
        writeln!(f, "server version  {}", meta.server_version)?;
        match meta.vendor_version {
            Some(version) => writeln!(f, "vendor version  {version}")?,
            None => writeln!(f, "vendor version  -")?,
        }
        writeln!(f, "tokens          {}", meta.tokens.len())?;
        for warning in &self.warnings {
            writeln!(f, "warning: {warning:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{Row, VersionNumber};
    use serde_json::json;

    #[test]
    fn test_row_from_json() {
        let row = row_from_json(&json!({
            "rack": "r1",
            "rpc_address": "10.1.1.1",
            "tokens": ["-5", "17"],
            "num": 3,
            "gone": null
        }))
        .unwrap();

        assert_eq!(row.get_string_by_name("rack").as_deref(), Some("r1"));
        assert_eq!(row.get_by_name("rpc_address"), Some(&Value::Inet(vec![10, 1, 1, 1])));
        assert!(row.get_by_name("tokens").unwrap().is_collection());
        assert_eq!(row.get_by_name("num"), Some(&Value::Int(3)));
        assert!(row.get_by_name("gone").unwrap().is_null());
    }

    #[test]
    fn test_row_must_be_flat_object() {
        assert!(row_from_json(&json!(["rack"])).is_err());
        assert!(row_from_json(&json!({"rack": {"name": "r1"}})).is_err());
    }

    #[test]
    fn test_run_applies_vendor_correction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("row.json");
        std::fs::write(
            &path,
            r#"{"release_version": "4.0.0", "dse_version": "6.5.0", "rpc_address": "0.0.0.0"}"#,
        )
        .unwrap();

        let args = HostArgs {
            address: "10.0.0.1:9042".parse().unwrap(),
            row: path,
            use_tokens: false,
        };
        let report = run(&args, &CoreConfig::default()).unwrap();

        assert_eq!(report.metadata.server_version, VersionNumber::new(3, 11, 0));
        assert_eq!(report.warnings, vec![HostWarning::BindAnyRpcAddress]);
        assert_eq!(report.connect_address, report.address);
    }
}
