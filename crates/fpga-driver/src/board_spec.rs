// SPDX-License-Identifier: AGPL-3.0-only

//! Board specification lookup
//!
//! Two external facts feed the probes:
//!
//! - the **compiled kernel clock fmax**, recorded by the compiler in
//!   `quartus.json` inside the compile reports directory;
//! - the **global memory topology**, described by the board support
//!   package in `board_spec.xml` under the directory named by
//!   `OFS_OCL_SHIM_ROOT_HW`.
//!
//! Both are reached through [`BoardSpecProvider`], so probes see typed
//! values and typed failures. [`FileBoardSpec`] reads the files,
//! [`StaticBoardSpec`] supplies fixed values.

use fpga_chip::{BoardTopology, MemInterface};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the board support package hardware root.
pub const SHIM_ROOT_ENV: &str = "OFS_OCL_SHIM_ROOT_HW";

/// Report directories searched, relative to the base directory, in order.
pub const REPORT_DIRS: [&str; 2] = ["reports/lib/json", "board_test.prj/reports/lib/json"];

/// Compile report holding the fmax entry.
pub const REPORT_FILE: &str = "quartus.json";

/// Entry in [`REPORT_FILE`] holding the compiled kernel clock in MHz.
pub const FMAX_KEY: &str = "kernel clock fmax";

/// Board specification file under the shim root.
pub const BOARD_SPEC_FILE: &str = "board_spec.xml";

/// Why a board specification value is unavailable
#[derive(Debug, Error)]
pub enum SpecLookupError {
    /// None of the candidate report directories exist
    #[error("Compile reports directory not found (searched {searched:?})")]
    ReportsDirNotFound {
        /// Directories tried
        searched: Vec<PathBuf>,
    },

    /// Reports directory exists but the report file does not
    #[error("Report file missing: {}", .0.display())]
    ReportFileMissing(PathBuf),

    /// File exists but could not be read
    #[error("Cannot read {}: {source}", .path.display())]
    Unreadable {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File content could not be interpreted
    #[error("Malformed {}: {reason}", .path.display())]
    Malformed {
        /// File path
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Report parsed but has no fmax entry
    #[error("No \"kernel clock fmax\" entry in {}", .0.display())]
    EntryMissing(PathBuf),

    /// Shim root environment variable not set
    #[error("OFS_OCL_SHIM_ROOT_HW is not set")]
    ShimRootUnset,

    /// Board specification file missing under the shim root
    #[error("Board specification missing: {}", .0.display())]
    BoardSpecMissing(PathBuf),

    /// No global memory system contains the bank at address 0x0
    #[error("No default global memory in {}", .0.display())]
    NoGlobalMemory(PathBuf),

    /// A fixed provider was built without this value
    #[error("{0} not provided")]
    NotProvided(&'static str),
}

impl SpecLookupError {
    fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Source of board specification values
pub trait BoardSpecProvider: std::fmt::Debug {
    /// Kernel clock frequency the bitstream was compiled for, MHz
    ///
    /// # Errors
    ///
    /// Returns the reason the value is unavailable.
    fn compiled_fmax_mhz(&self) -> Result<f64, SpecLookupError>;

    /// Default global memory topology
    ///
    /// # Errors
    ///
    /// Returns the reason the record is unavailable.
    fn topology(&self) -> Result<BoardTopology, SpecLookupError>;
}

/// Board specification read from compile reports and `board_spec.xml`
#[derive(Debug, Clone)]
pub struct FileBoardSpec {
    base_dir: PathBuf,
    shim_root: Option<PathBuf>,
}

impl FileBoardSpec {
    /// Reports under `base_dir`, no board specification.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            shim_root: None,
        }
    }

    /// Reports under `base_dir`, shim root from [`SHIM_ROOT_ENV`].
    pub fn from_env(base_dir: impl Into<PathBuf>) -> Self {
        let shim_root = std::env::var_os(SHIM_ROOT_ENV).map(PathBuf::from);
        Self::new(base_dir).with_shim_root(shim_root)
    }

    /// Override the shim root.
    #[must_use]
    pub fn with_shim_root(mut self, shim_root: Option<PathBuf>) -> Self {
        self.shim_root = shim_root;
        self
    }

    fn reports_dir(&self) -> Result<PathBuf, SpecLookupError> {
        let searched: Vec<PathBuf> = REPORT_DIRS.iter().map(|d| self.base_dir.join(d)).collect();
        match searched.iter().find(|d| d.is_dir()) {
            Some(dir) => Ok(dir.clone()),
            None => Err(SpecLookupError::ReportsDirNotFound { searched }),
        }
    }
}

fn read_file(path: &Path) -> Result<String, SpecLookupError> {
    std::fs::read_to_string(path).map_err(|source| SpecLookupError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

impl BoardSpecProvider for FileBoardSpec {
    fn compiled_fmax_mhz(&self) -> Result<f64, SpecLookupError> {
        let path = self.reports_dir()?.join(REPORT_FILE);
        if !path.is_file() {
            return Err(SpecLookupError::ReportFileMissing(path));
        }
        let text = read_file(&path)?;
        let report: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| SpecLookupError::malformed(&path, e.to_string()))?;
        let entry =
            find_key(&report, FMAX_KEY).ok_or_else(|| SpecLookupError::EntryMissing(path.clone()))?;
        let fmax = match entry {
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        }
        .filter(|f| f.is_finite() && *f > 0.0)
        .ok_or_else(|| SpecLookupError::malformed(&path, format!("\"{FMAX_KEY}\" is {entry}")))?;
        debug!("compiled fmax {fmax} MHz from {}", path.display());
        Ok(fmax)
    }

    fn topology(&self) -> Result<BoardTopology, SpecLookupError> {
        let root = self.shim_root.as_ref().ok_or(SpecLookupError::ShimRootUnset)?;
        let path = root.join(BOARD_SPEC_FILE);
        if !path.is_file() {
            return Err(SpecLookupError::BoardSpecMissing(path));
        }
        let text = read_file(&path)?;
        let topo = parse_board_spec(&text)
            .map_err(|reason| SpecLookupError::malformed(&path, reason))?
            .ok_or_else(|| SpecLookupError::NoGlobalMemory(path.clone()))?;
        debug!(
            "{} channel(s), {} MB/s from {}",
            topo.channel_count(),
            topo.max_bandwidth_mb_s,
            path.display()
        );
        Ok(topo)
    }
}

/// Fixed board specification values
#[derive(Debug, Clone, Default)]
pub struct StaticBoardSpec {
    /// Compiled kernel clock, MHz
    pub fmax_mhz: Option<f64>,
    /// Global memory topology
    pub topology: Option<BoardTopology>,
}

impl BoardSpecProvider for StaticBoardSpec {
    fn compiled_fmax_mhz(&self) -> Result<f64, SpecLookupError> {
        self.fmax_mhz.ok_or(SpecLookupError::NotProvided("compiled fmax"))
    }

    fn topology(&self) -> Result<BoardTopology, SpecLookupError> {
        self.topology
            .clone()
            .ok_or(SpecLookupError::NotProvided("board topology"))
    }
}

/// Depth-first search for `key` anywhere in a JSON document.
fn find_key<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        serde_json::Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

/// Scan `board_spec.xml` text for the global memory system containing the
/// bank at address `0x0`.
///
/// `Ok(None)` when no such system exists; `Err` names a malformed attribute.
fn parse_board_spec(xml: &str) -> Result<Option<BoardTopology>, String> {
    let xml = strip_comments(xml);
    let mut rest = xml.as_str();
    while let Some((tag, after)) = next_element(rest, "global_mem") {
        let (body, next) = match after.find("</global_mem>") {
            Some(end) if !tag.ends_with('/') => (&after[..end], &after[end..]),
            _ => ("", after),
        };
        rest = next;

        let max_bandwidth_mb_s = match attribute(tag, "max_bandwidth") {
            Some(v) => v
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("global_mem max_bandwidth \"{v}\""))?,
            None => return Err("global_mem without max_bandwidth".into()),
        };

        let mut interfaces = Vec::new();
        let mut inner = body;
        while let Some((itag, iafter)) = next_element(inner, "interface") {
            inner = iafter;
            let address = attribute(itag, "address")
                .ok_or_else(|| "interface without address".to_string())?;
            interfaces.push(MemInterface {
                address: parse_u64(address)?,
                size: attribute(itag, "size").map(parse_u64).transpose()?.unwrap_or(0),
            });
        }

        let topo = BoardTopology {
            memory_name: attribute(tag, "name").map(str::to_string),
            max_bandwidth_mb_s,
            interfaces,
        };
        if topo.starts_at_zero() {
            return Ok(Some(topo));
        }
    }
    Ok(None)
}

fn strip_comments(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find("-->") {
            Some(end) => &rest[start + end + 3..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Next `<name ...>` start tag: its attribute text and the text after it.
fn next_element<'a>(text: &'a str, name: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{name}");
    let mut from = 0;
    loop {
        let start = from + text[from..].find(&open)? + open.len();
        let boundary = text[start..].chars().next()?;
        if boundary.is_whitespace() || boundary == '>' || boundary == '/' {
            let end = start + text[start..].find('>')?;
            return Some((&text[start..end], &text[end + 1..]));
        }
        from = start;
    }
}

/// Value of attribute `name` in start-tag text.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(pos) = tag[from..].find(name) {
        let at = from + pos;
        from = at + name.len();
        let preceded = tag[..at].chars().next_back().is_some_and(char::is_whitespace);
        let after = tag[from..].trim_start();
        if !preceded || !after.starts_with('=') {
            continue;
        }
        let value = after[1..].trim_start();
        let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value = &value[1..];
        return value.find(quote).map(|end| &value[..end]);
    }
    None
}

fn parse_u64(text: &str) -> Result<u64, String> {
    let t = text.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => t.parse::<u64>(),
    };
    parsed.map_err(|_| format!("bad integer \"{text}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BOARD_SPEC: &str = r#"<?xml version="1.0"?>
<board version="2021.4" name="ofs_n6001">
  <device device_model="agfb014r24a2e2v_dm.xml">
    <used_resources><alms num="0"/></used_resources>
  </device>
  <!-- <global_mem name="old" max_bandwidth="1"><interface address="0x0"/></global_mem> -->
  <global_mem name="HOST" max_bandwidth="16000" interleaved_bytes="64" config_addr="0x018">
    <interface name="board" port="host_mem" type="agw" width="512" maxburst="16" address="0x400000000000" size="0x400000000000" latency="800"/>
  </global_mem>
  <global_mem name="DDR" max_bandwidth="76800" interleaved_bytes="4096" config_addr="0x018" default="1">
    <interface name="board" port="mem0" type="agw" width="512" maxburst="16" address="0x000000000" size="0x100000000" latency="800"/>
    <interface name="board" port="mem1" type="agw" width="512" maxburst="16" address="0x100000000" size="0x100000000" latency="800"/>
    <interface name="board" port="mem2" type="agw" width="512" maxburst="16" address="0x200000000" size="0x100000000" latency="800"/>
    <interface name="board" port="mem3" type="agw" width="512" maxburst="16" address="0x300000000" size="0x100000000" latency="800"/>
  </global_mem>
</board>
"#;

    fn write_report(base: &Path, dir: &str, body: &str) {
        let dir = base.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(REPORT_FILE), body).unwrap();
    }

    #[test]
    fn fmax_from_string_entry() {
        let tmp = tempfile::tempdir().unwrap();
        write_report(
            tmp.path(),
            REPORT_DIRS[0],
            r#"{"quartusFitClockSummary": {"nodes": [{"name": "Quartus Fitter: Clock Frequency (MHz)", "kernel clock": "301.2", "kernel clock fmax" : "301.2"}]}}"#,
        );
        let spec = FileBoardSpec::new(tmp.path());
        assert!((spec.compiled_fmax_mhz().unwrap() - 301.2).abs() < 1e-9);
    }

    #[test]
    fn fmax_from_project_reports_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write_report(tmp.path(), REPORT_DIRS[1], r#"{"kernel clock fmax": 480}"#);
        let spec = FileBoardSpec::new(tmp.path());
        assert!((spec.compiled_fmax_mhz().unwrap() - 480.0).abs() < 1e-9);
    }

    #[test]
    fn fmax_lookup_failures_are_distinct() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = FileBoardSpec::new(tmp.path());
        assert!(matches!(
            spec.compiled_fmax_mhz(),
            Err(SpecLookupError::ReportsDirNotFound { ref searched }) if searched.len() == 2
        ));

        fs::create_dir_all(tmp.path().join(REPORT_DIRS[0])).unwrap();
        assert!(matches!(spec.compiled_fmax_mhz(), Err(SpecLookupError::ReportFileMissing(_))));

        write_report(tmp.path(), REPORT_DIRS[0], "{ not json");
        assert!(matches!(spec.compiled_fmax_mhz(), Err(SpecLookupError::Malformed { .. })));

        write_report(tmp.path(), REPORT_DIRS[0], r#"{"kernel clock": "300"}"#);
        assert!(matches!(spec.compiled_fmax_mhz(), Err(SpecLookupError::EntryMissing(_))));

        write_report(tmp.path(), REPORT_DIRS[0], r#"{"kernel clock fmax": "n/a"}"#);
        assert!(matches!(spec.compiled_fmax_mhz(), Err(SpecLookupError::Malformed { .. })));
    }

    #[test]
    fn fmax_must_be_finite_and_positive() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = FileBoardSpec::new(tmp.path());
        for body in [
            r#"{"kernel clock fmax": "nan"}"#,
            r#"{"kernel clock fmax": "inf"}"#,
            r#"{"kernel clock fmax": "-300"}"#,
            r#"{"kernel clock fmax": 0}"#,
        ] {
            write_report(tmp.path(), REPORT_DIRS[0], body);
            assert!(
                matches!(spec.compiled_fmax_mhz(), Err(SpecLookupError::Malformed { .. })),
                "{body}"
            );
        }
    }

    #[test]
    fn topology_picks_memory_at_address_zero() {
        let topo = parse_board_spec(BOARD_SPEC).unwrap().unwrap();
        assert_eq!(topo.memory_name.as_deref(), Some("DDR"));
        assert_eq!(topo.channel_count(), 4);
        assert_eq!(topo.per_channel_bandwidth_mb_s(), Some(19_200.0));
        assert_eq!(topo.interfaces[1].address, 0x1_0000_0000);
        assert_eq!(topo.interfaces[1].size, 0x1_0000_0000);
    }

    #[test]
    fn topology_without_zero_bank_is_none() {
        let xml = r#"<board><global_mem name="HBM" max_bandwidth="100"><interface address="0x10" size="16"/></global_mem></board>"#;
        assert_eq!(parse_board_spec(xml).unwrap(), None);
    }

    #[test]
    fn bad_bandwidth_is_malformed() {
        let xml = r#"<global_mem max_bandwidth="fast"><interface address="0"/></global_mem>"#;
        assert!(parse_board_spec(xml).is_err());
    }

    #[test]
    fn topology_from_shim_root() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = FileBoardSpec::new(tmp.path()).with_shim_root(Some(tmp.path().to_path_buf()));
        assert!(matches!(spec.topology(), Err(SpecLookupError::BoardSpecMissing(_))));

        fs::write(tmp.path().join(BOARD_SPEC_FILE), BOARD_SPEC).unwrap();
        assert_eq!(spec.topology().unwrap().channel_count(), 4);

        let unset = FileBoardSpec::new(tmp.path());
        assert!(matches!(unset.topology(), Err(SpecLookupError::ShimRootUnset)));
    }

    #[test]
    fn attribute_matches_whole_names() {
        let tag = r#" name="board" max_bandwidth="7" bandwidth='3'"#;
        assert_eq!(attribute(tag, "bandwidth"), Some("3"));
        assert_eq!(attribute(tag, "max_bandwidth"), Some("7"));
        assert_eq!(attribute(tag, "name"), Some("board"));
        assert_eq!(attribute(tag, "port"), None);
    }

    #[test]
    fn static_spec_reports_missing_values() {
        let spec = StaticBoardSpec {
            fmax_mhz: Some(300.0),
            topology: None,
        };
        assert!((spec.compiled_fmax_mhz().unwrap() - 300.0).abs() < f64::EPSILON);
        assert!(matches!(spec.topology(), Err(SpecLookupError::NotProvided(_))));
    }
}
