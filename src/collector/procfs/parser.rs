//! Parsers for `/proc`, `/sys` and `/etc` files.
//!
//! These are pure functions that parse the content of various kernel and
//! system files into structured data. They are designed to be easily testable
//! with string inputs.

use std::collections::BTreeMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

// ============ Memory ============

/// Parsed data from `/proc/meminfo`. All values are in kB.
#[derive(Debug, Clone, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_cached: u64,
    pub active: u64,
    pub inactive: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub dirty: u64,
    pub writeback: u64,
    pub shmem: u64,
    pub slab: u64,
    pub s_reclaimable: u64,
    pub s_unreclaim: u64,
    pub page_tables: u64,
    pub committed_as: u64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut seen_total = false;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value: u64 = rest
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        match key {
            "MemTotal" => {
                info.mem_total = value;
                seen_total = true;
            }
            "MemFree" => info.mem_free = value,
            "MemAvailable" => info.mem_available = value,
            "Buffers" => info.buffers = value,
            "Cached" => info.cached = value,
            "SwapCached" => info.swap_cached = value,
            "Active" => info.active = value,
            "Inactive" => info.inactive = value,
            "SwapTotal" => info.swap_total = value,
            "SwapFree" => info.swap_free = value,
            "Dirty" => info.dirty = value,
            "Writeback" => info.writeback = value,
            "Shmem" => info.shmem = value,
            "Slab" => info.slab = value,
            "SReclaimable" => info.s_reclaimable = value,
            "SUnreclaim" => info.s_unreclaim = value,
            "PageTables" => info.page_tables = value,
            "Committed_AS" => info.committed_as = value,
            _ => {}
        }
    }

    if !seen_total {
        return Err(ParseError::new("MemTotal missing from meminfo"));
    }

    Ok(info)
}

/// One row of `/proc/swaps`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapDevice {
    pub name: String,
    pub kind: String,
    /// Size in kB.
    pub size: u64,
    /// Used in kB.
    pub used: u64,
    pub priority: i32,
}

/// Parses `/proc/swaps` content.
///
/// Format:
/// Filename      Type       Size     Used   Priority
/// /dev/sda2     partition  4194300  1024   -2
pub fn parse_swaps(content: &str) -> Result<Vec<SwapDevice>, ParseError> {
    let mut lines = content.lines();
    match lines.next() {
        Some(header) if header.starts_with("Filename") => {}
        Some(_) => return Err(ParseError::new("unexpected /proc/swaps header")),
        None => return Ok(Vec::new()),
    }

    let mut devices = Vec::new();
    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        devices.push(SwapDevice {
            name: unescape_octal(parts[0]),
            kind: parts[1].to_string(),
            size: parts[2].parse().unwrap_or(0),
            used: parts[3].parse().unwrap_or(0),
            priority: parts[4].parse().unwrap_or(0),
        });
    }
    Ok(devices)
}

// ============ CPU ============

/// Single CPU stats from `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuStat {
    pub cpu_id: Option<u32>, // None for aggregate "cpu" line
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuStat {
    /// Total ticks. Guest time is already accounted in user/nice.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Ticks spent not doing work.
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Global stats from `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct GlobalStat {
    pub cpus: Vec<CpuStat>,
    pub ctxt: u64,
    pub btime: u64,
    pub processes: u64,
    pub procs_running: u32,
    pub procs_blocked: u32,
}

/// Parses `/proc/stat` content.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let first_value = || -> u64 { parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0) };

        if parts[0].starts_with("cpu") {
            let cpu_id = if parts[0] == "cpu" {
                None
            } else {
                parts[0].strip_prefix("cpu").and_then(|s| s.parse().ok())
            };

            let get_val =
                |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

            stat.cpus.push(CpuStat {
                cpu_id,
                user: get_val(1),
                nice: get_val(2),
                system: get_val(3),
                idle: get_val(4),
                iowait: get_val(5),
                irq: get_val(6),
                softirq: get_val(7),
                steal: get_val(8),
                guest: get_val(9),
                guest_nice: get_val(10),
            });
        } else {
            match parts[0] {
                "ctxt" => stat.ctxt = first_value(),
                "btime" => stat.btime = first_value(),
                "processes" => stat.processes = first_value(),
                "procs_running" => stat.procs_running = first_value() as u32,
                "procs_blocked" => stat.procs_blocked = first_value() as u32,
                _ => {}
            }
        }
    }

    if stat.cpus.is_empty() {
        return Err(ParseError::new("no cpu lines in /proc/stat"));
    }

    Ok(stat)
}

/// One logical processor block from `/proc/cpuinfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuInfoEntry {
    pub processor: u32,
    pub vendor_id: String,
    pub family: String,
    pub model: String,
    pub stepping: i32,
    pub physical_id: String,
    pub core_id: String,
    pub cores: i32,
    pub model_name: String,
    pub mhz: f64,
    pub cache_size: i32,
    pub flags: Vec<String>,
    pub microcode: String,
}

/// Parses `/proc/cpuinfo` content into one entry per logical processor.
///
/// Blocks are separated by blank lines; each line is `key<TAB>: value`.
pub fn parse_cpuinfo(content: &str) -> Result<Vec<CpuInfoEntry>, ParseError> {
    let mut entries = Vec::new();
    let mut current: Option<CpuInfoEntry> = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            if line.trim().is_empty()
                && let Some(entry) = current.take()
            {
                entries.push(entry);
            }
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == "processor" {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            let processor = value
                .parse()
                .map_err(|_| ParseError::new(format!("invalid processor index '{}'", value)))?;
            current = Some(CpuInfoEntry {
                processor,
                ..Default::default()
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };
        match key {
            "vendor_id" => entry.vendor_id = value.to_string(),
            "cpu family" => entry.family = value.to_string(),
            "model" => entry.model = value.to_string(),
            "model name" => entry.model_name = value.to_string(),
            "stepping" => entry.stepping = value.parse().unwrap_or(0),
            "physical id" => entry.physical_id = value.to_string(),
            "core id" => entry.core_id = value.to_string(),
            "cpu cores" => entry.cores = value.parse().unwrap_or(0),
            "cpu MHz" => entry.mhz = value.parse().unwrap_or(0.0),
            // "512 KB"
            "cache size" => {
                entry.cache_size = value
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0)
            }
            "flags" | "Features" => {
                entry.flags = value.split_whitespace().map(str::to_string).collect()
            }
            "microcode" => entry.microcode = value.to_string(),
            _ => {}
        }
    }

    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    Ok(entries)
}

/// Parsed data from `/proc/loadavg`.
#[derive(Debug, Clone, Default)]
pub struct LoadAvg {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub running: u32,
    pub total: u32,
    pub last_pid: u32,
}

/// Parses `/proc/loadavg` content.
pub fn parse_loadavg(content: &str) -> Result<LoadAvg, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let load1 = parts[0]
        .parse()
        .map_err(|_| ParseError::new("invalid load1"))?;
    let load5 = parts[1]
        .parse()
        .map_err(|_| ParseError::new("invalid load5"))?;
    let load15 = parts[2]
        .parse()
        .map_err(|_| ParseError::new("invalid load15"))?;

    // Format: running/total
    let (running, total) = if let Some((r, t)) = parts[3].split_once('/') {
        (r.parse().unwrap_or(0), t.parse().unwrap_or(0))
    } else {
        (0, 0)
    };

    let last_pid = parts[4].parse().unwrap_or(0);

    Ok(LoadAvg {
        load1,
        load5,
        load15,
        running,
        total,
        last_pid,
    })
}

// ============ Disks ============

/// Parsed data from `/proc/diskstats`.
#[derive(Debug, Clone, Default)]
pub struct DiskStats {
    /// Block device major number.
    pub major: u32,
    /// Block device minor number.
    pub minor: u32,
    /// Device name (sda, nvme0n1, etc.)
    pub device: String,
    /// Number of reads completed
    pub reads: u64,
    /// Number of read requests merged
    pub r_merged: u64,
    /// Number of sectors read
    pub read_sectors: u64,
    /// Time spent reading (ms)
    pub read_time: u64,
    /// Number of writes completed
    pub writes: u64,
    /// Number of write requests merged
    pub w_merged: u64,
    /// Number of sectors written
    pub write_sectors: u64,
    /// Time spent writing (ms)
    pub write_time: u64,
    /// Number of I/Os currently in progress
    pub io_in_progress: u64,
    /// Time spent doing I/Os (ms)
    pub io_time: u64,
    /// Weighted time spent doing I/Os (ms)
    pub io_weighted_time: u64,
}

/// Parses `/proc/diskstats` content.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged w_sectors w_time io_pending io_time w_io_time [discards ...]
pub fn parse_diskstats(content: &str) -> Result<Vec<DiskStats>, ParseError> {
    let mut disks = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue; // Skip malformed lines
        }

        let get_val =
            |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        disks.push(DiskStats {
            major: get_val(0) as u32,
            minor: get_val(1) as u32,
            device: parts[2].to_string(),
            reads: get_val(3),
            r_merged: get_val(4),
            read_sectors: get_val(5),
            read_time: get_val(6),
            writes: get_val(7),
            w_merged: get_val(8),
            write_sectors: get_val(9),
            write_time: get_val(10),
            io_in_progress: get_val(11),
            io_time: get_val(12),
            io_weighted_time: get_val(13),
        });
    }

    Ok(disks)
}

/// One entry from `/proc/self/mounts`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: String,
}

/// Parses `/proc/self/mounts` (fstab format).
///
/// Spaces and tabs inside paths are octal-escaped by the kernel (`\040`).
pub fn parse_mounts(content: &str) -> Result<Vec<MountEntry>, ParseError> {
    let mut mounts = Vec::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        mounts.push(MountEntry {
            device: unescape_octal(parts[0]),
            mount_point: unescape_octal(parts[1]),
            fs_type: parts[2].to_string(),
            options: parts[3].to_string(),
        });
    }
    Ok(mounts)
}

/// Decodes kernel `\NNN` octal escapes.
fn unescape_octal(s: &str) -> String {
    if !s.contains('\\') {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let is_octal = |b: u8| (b'0'..=b'7').contains(&b);
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 4 <= bytes.len()
            && bytes[i + 1..i + 4].iter().all(|&b| is_octal(b))
        {
            let code = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, &b| acc * 8 + u32::from(b - b'0'));
            out.push(code as u8);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ============ Network ============

/// Parsed data from `/proc/net/dev`.
#[derive(Debug, Clone, Default)]
pub struct NetDevStats {
    /// Interface name (eth0, lo, etc.)
    pub interface: String,
    /// Bytes received
    pub rx_bytes: u64,
    /// Packets received
    pub rx_packets: u64,
    /// Receive errors
    pub rx_errs: u64,
    /// Receive drops
    pub rx_drop: u64,
    /// Bytes transmitted
    pub tx_bytes: u64,
    /// Packets transmitted
    pub tx_packets: u64,
    /// Transmit errors
    pub tx_errs: u64,
    /// Transmit drops
    pub tx_drop: u64,
}

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn parse_net_dev(content: &str) -> Result<Vec<NetDevStats>, ParseError> {
    let mut devices = Vec::new();

    for line in content.lines() {
        // Skip header lines
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };

        let values: Vec<&str> = counters.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        let get_val =
            |idx: usize| -> u64 { values.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        devices.push(NetDevStats {
            interface: name.trim().to_string(),
            rx_bytes: get_val(0),
            rx_packets: get_val(1),
            rx_errs: get_val(2),
            rx_drop: get_val(3),
            tx_bytes: get_val(8),
            tx_packets: get_val(9),
            tx_errs: get_val(10),
            tx_drop: get_val(11),
        });
    }

    Ok(devices)
}

/// Protocol counters from `/proc/net/snmp`, keyed by lowercase protocol
/// (`ip`, `icmp`, `tcp`, `udp`, ...) and then by counter name.
pub type ProtoCounters = BTreeMap<String, BTreeMap<String, i64>>;

/// Parses `/proc/net/snmp` content.
///
/// Format: Each protocol has two lines - keys and values
/// Tcp: key1 key2 key3...
/// Tcp: val1 val2 val3...
pub fn parse_net_snmp(content: &str) -> Result<ProtoCounters, ParseError> {
    let mut protocols = ProtoCounters::new();
    let lines: Vec<&str> = content.lines().collect();

    let mut i = 0;
    while i + 1 < lines.len() {
        let key_parts: Vec<&str> = lines[i].split_whitespace().collect();
        let val_parts: Vec<&str> = lines[i + 1].split_whitespace().collect();

        // Both lines must carry the same prefix (e.g., "Tcp:")
        if key_parts.is_empty() || val_parts.is_empty() || key_parts[0] != val_parts[0] {
            i += 1;
            continue;
        }

        let protocol = key_parts[0].trim_end_matches(':').to_lowercase();
        let counters = protocols.entry(protocol).or_default();
        for (key, value) in key_parts[1..].iter().zip(&val_parts[1..]) {
            counters.insert((*key).to_string(), value.parse().unwrap_or(0));
        }
        i += 2;
    }

    if protocols.is_empty() {
        return Err(ParseError::new("no protocol sections in /proc/net/snmp"));
    }

    Ok(protocols)
}

/// Maps a TCP state code from `/proc/net/tcp` to its conventional name.
pub fn tcp_state_name(code: u8) -> &'static str {
    match code {
        0x01 => "ESTABLISHED",
        0x02 => "SYN_SENT",
        0x03 => "SYN_RECV",
        0x04 => "FIN_WAIT1",
        0x05 => "FIN_WAIT2",
        0x06 => "TIME_WAIT",
        0x07 => "CLOSE",
        0x08 => "CLOSE_WAIT",
        0x09 => "LAST_ACK",
        0x0A => "LISTEN",
        0x0B => "CLOSING",
        0x0C => "NEW_SYN_RECV",
        _ => "NONE",
    }
}

/// Counts sockets per state in `/proc/net/tcp` or `/proc/net/tcp6`.
///
/// Format (after one header line):
/// sl local_address rem_address st tx_queue:rx_queue ...
pub fn parse_tcp_states(content: &str) -> Result<BTreeMap<&'static str, u64>, ParseError> {
    let mut lines = content.lines();
    if lines.next().is_none() {
        return Err(ParseError::new("empty socket table"));
    }

    let mut states = BTreeMap::new();
    for line in lines {
        let Some(state) = line.split_whitespace().nth(3) else {
            continue;
        };
        let Ok(code) = u8::from_str_radix(state, 16) else {
            continue;
        };
        *states.entry(tcp_state_name(code)).or_insert(0) += 1;
    }
    Ok(states)
}

// ============ Host ============

/// Selected fields from `/etc/os-release`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: String,
    pub version_id: String,
    pub pretty_name: String,
}

/// Parses `/etc/os-release` (shell-style `KEY=value` pairs).
pub fn parse_os_release(content: &str) -> OsRelease {
    let mut release = OsRelease::default();
    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim_matches('"').trim_matches('\'').to_string();
        match key {
            "ID" => release.id = value,
            "ID_LIKE" => release.id_like = value,
            "VERSION_ID" => release.version_id = value,
            "PRETTY_NAME" => release.pretty_name = value,
            _ => {}
        }
    }
    release
}

/// Parses `/proc/uptime` into seconds since boot.
pub fn parse_uptime(content: &str) -> Result<f64, ParseError> {
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::new("invalid uptime format"))
}

/// Parses a thermal zone `temp` file (millidegrees Celsius).
pub fn parse_thermal_temp(content: &str) -> Result<f64, ParseError> {
    content
        .trim()
        .parse::<i64>()
        .map(|milli| milli as f64 / 1000.0)
        .map_err(|_| ParseError::new(format!("invalid temperature '{}'", content.trim())))
}

/// A logged-in user session from utmp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UtmpEntry {
    pub user: String,
    pub terminal: String,
    pub host: String,
    /// Session start, seconds since the epoch.
    pub started: i64,
}

const UTMP_RECORD_SIZE: usize = 384;
const UTMP_USER_PROCESS: i16 = 7;

/// Parses a glibc utmp file, keeping only `USER_PROCESS` records.
///
/// Record layout (Linux, 384 bytes): ut_type i16 @0, ut_pid i32 @4,
/// ut_line [32] @8, ut_id [4] @40, ut_user [32] @44, ut_host [256] @76,
/// ut_exit @332, ut_session i32 @336, ut_tv.tv_sec i32 @340.
pub fn parse_utmp(content: &[u8]) -> Result<Vec<UtmpEntry>, ParseError> {
    if content.len() % UTMP_RECORD_SIZE != 0 {
        return Err(ParseError::new(format!(
            "utmp size {} is not a multiple of {}",
            content.len(),
            UTMP_RECORD_SIZE
        )));
    }

    let c_str = |bytes: &[u8]| -> String {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    };

    let mut entries = Vec::new();
    for record in content.chunks_exact(UTMP_RECORD_SIZE) {
        let ut_type = i16::from_ne_bytes([record[0], record[1]]);
        if ut_type != UTMP_USER_PROCESS {
            continue;
        }
        let tv_sec = i32::from_ne_bytes([record[340], record[341], record[342], record[343]]);
        entries.push(UtmpEntry {
            user: c_str(&record[44..76]),
            terminal: c_str(&record[8..40]),
            host: c_str(&record[76..332]),
            started: i64::from(tv_sec),
        });
    }
    Ok(entries)
}

// ============ Processes ============

/// Fields of `/proc/[pid]/stat` the process meter needs.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: i64,
    pub starttime: u64,
    pub vsize: u64,
    /// Resident set size in pages.
    pub rss: i64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The format is tricky because the comm field can contain spaces and parentheses.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    // Find the comm field boundaries (enclosed in parentheses)
    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let parse_field = |idx: usize, name: &str| -> Result<i64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    let parse_field_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: parse_field(1, "ppid")? as u32,
        utime: parse_field_u64(11, "utime")?,
        stime: parse_field_u64(12, "stime")?,
        num_threads: parse_field(17, "num_threads")?,
        starttime: parse_field_u64(19, "starttime")?,
        vsize: parse_field_u64(20, "vsize")?,
        rss: parse_field(21, "rss")?,
    })
}
