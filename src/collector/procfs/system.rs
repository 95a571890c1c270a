//! System collector for gathering host-wide metrics from `/proc` and `/sys`.

use crate::collector::CollectError;
use crate::collector::ProviderPaths;
use crate::collector::procfs::parser::{
    CpuInfoEntry, DiskStats, GlobalStat, LoadAvg, MemInfo, MountEntry, NetDevStats,
    ProtoCounters, SwapDevice, UtmpEntry, parse_cpuinfo, parse_diskstats, parse_global_stat,
    parse_loadavg, parse_meminfo, parse_mounts, parse_net_dev, parse_net_snmp, parse_os_release,
    parse_proc_stat, parse_swaps, parse_tcp_states, parse_thermal_temp, parse_uptime, parse_utmp,
};
use crate::collector::traits::FileSystem;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// Filesystem types that never represent a real disk partition.
pub const IGNORED_FILESYSTEMS: &[&str] = &[
    "",
    "squashfs",
    "binfmt_misc",
    "tmpfs",
    "sysfs",
    "proc",
    "mqueue",
    "hugetlbfs",
    "debugfs",
    "rpc_pipefs",
    "devtmpfs",
    "devpts",
    "securityfs",
    "pstore",
    "efivarfs",
    "bpf",
    "autofs",
    "tracefs",
    "ramfs",
    "fuse.portal",
    "nsfs",
    "cgroup",
    "cgroup2",
    "configfs",
    "fusectl",
    "overlay",
];

/// Kernel page size assumed for RSS conversion.
const PAGE_SIZE: u64 = 4096;

/// Static CPU layout read once at meter start.
#[derive(Debug, Clone, Default)]
pub struct CpuTopology {
    pub cores: Vec<CpuInfoEntry>,
    /// Distinct (physical id, core id) pairs.
    pub physical: u32,
    /// Logical processors.
    pub logical: u32,
}

/// Capacity of one mounted filesystem, in bytes and inodes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskUsage {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_percent: f64,
    pub inodes_total: u64,
    pub inodes_free: u64,
    pub inodes_used: u64,
    pub inodes_used_percent: f64,
}

/// Static attributes of a network interface from `/sys/class/net`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceInfo {
    pub name: String,
    pub mtu: i64,
    pub hardware_addr: String,
    pub oper_state: String,
}

/// Host description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub kernel_version: String,
    pub kernel_arch: String,
    /// Seconds since the epoch.
    pub boot_time: i64,
    /// Seconds since boot.
    pub uptime: f64,
    pub virtualization_system: String,
    pub virtualization_role: String,
}

/// One thermal sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Temperature {
    pub sensor_key: String,
    pub celsius: f64,
}

/// One process whose name matched a configured filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    pub rss_bytes: u64,
    pub vsize_bytes: u64,
    /// utime + stime, in clock ticks.
    pub cpu_ticks: u64,
    pub threads: i64,
}

/// Collects host-wide metrics from `/proc` and `/sys`.
#[derive(Clone)]
pub struct SystemCollector<F: FileSystem> {
    fs: F,
    paths: ProviderPaths,
}

impl<F: FileSystem> SystemCollector<F> {
    /// Creates a new system collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `paths` - Roots of the proc, sys and etc trees
    pub fn new(fs: F, paths: ProviderPaths) -> Self {
        Self { fs, paths }
    }

    fn proc(&self, rel: &str) -> PathBuf {
        PathBuf::from(format!("{}/{}", self.paths.proc_path, rel))
    }

    fn sys(&self, rel: &str) -> PathBuf {
        PathBuf::from(format!("{}/{}", self.paths.sys_path, rel))
    }

    fn read_trimmed(&self, path: &Path) -> Result<String, CollectError> {
        Ok(self.fs.read_to_string(path)?.trim().to_string())
    }

    /// Collects CPU times and scheduler counters from `/proc/stat`.
    ///
    /// `cpus[0]` is the aggregate line, the rest are per core.
    pub fn cpu_times(&self) -> Result<GlobalStat, CollectError> {
        let content = self.fs.read_to_string(&self.proc("stat"))?;
        parse_global_stat(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects static CPU layout from `/proc/cpuinfo`.
    pub fn cpu_topology(&self) -> Result<CpuTopology, CollectError> {
        let content = self.fs.read_to_string(&self.proc("cpuinfo"))?;
        let cores = parse_cpuinfo(&content).map_err(|e| CollectError::Parse(e.message))?;
        if cores.is_empty() {
            return Err(CollectError::Parse("no processors in cpuinfo".to_string()));
        }

        let physical: HashSet<(&str, &str)> = cores
            .iter()
            .filter(|c| !c.core_id.is_empty())
            .map(|c| (c.physical_id.as_str(), c.core_id.as_str()))
            .collect();
        let logical = cores.len() as u32;
        let physical = if physical.is_empty() {
            logical
        } else {
            physical.len() as u32
        };

        Ok(CpuTopology {
            cores,
            physical,
            logical,
        })
    }

    /// Collects load average from `/proc/loadavg`.
    pub fn loadavg(&self) -> Result<LoadAvg, CollectError> {
        let content = self.fs.read_to_string(&self.proc("loadavg"))?;
        parse_loadavg(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects memory information from `/proc/meminfo`.
    pub fn meminfo(&self) -> Result<MemInfo, CollectError> {
        let content = self.fs.read_to_string(&self.proc("meminfo"))?;
        parse_meminfo(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects active swap areas from `/proc/swaps`.
    pub fn swap_devices(&self) -> Result<Vec<SwapDevice>, CollectError> {
        let content = self.fs.read_to_string(&self.proc("swaps"))?;
        parse_swaps(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects real partitions from `/proc/self/mounts`.
    ///
    /// Pseudo filesystems are dropped and each mount point is kept once
    /// (the last mount wins, as it shadows earlier ones).
    pub fn partitions(&self) -> Result<Vec<MountEntry>, CollectError> {
        let content = self.fs.read_to_string(&self.proc("self/mounts"))?;
        let mounts = parse_mounts(&content).map_err(|e| CollectError::Parse(e.message))?;

        let mut by_mount_point: BTreeMap<String, MountEntry> = BTreeMap::new();
        for mount in mounts {
            if IGNORED_FILESYSTEMS.contains(&mount.fs_type.as_str()) {
                continue;
            }
            by_mount_point.insert(mount.mount_point.clone(), mount);
        }
        Ok(by_mount_point.into_values().collect())
    }

    /// Queries capacity of the filesystem mounted at `mount_point`.
    pub fn usage(&self, mount_point: &str) -> Result<DiskUsage, CollectError> {
        let stat = self.fs.statvfs(Path::new(mount_point))?;

        let total = stat.blocks * stat.block_size;
        let free = stat.blocks_avail * stat.block_size;
        let used = (stat.blocks - stat.blocks_free.min(stat.blocks)) * stat.block_size;
        let inodes_used = stat.files.saturating_sub(stat.files_free);

        Ok(DiskUsage {
            total,
            free,
            used,
            used_percent: percent(used, used + free),
            inodes_total: stat.files,
            inodes_free: stat.files_free,
            inodes_used,
            inodes_used_percent: percent(inodes_used, stat.files),
        })
    }

    /// Collects per-device IO counters from `/proc/diskstats`.
    pub fn diskstats(&self) -> Result<Vec<DiskStats>, CollectError> {
        let content = self.fs.read_to_string(&self.proc("diskstats"))?;
        parse_diskstats(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects network interface counters from `/proc/net/dev`.
    pub fn net_dev(&self) -> Result<Vec<NetDevStats>, CollectError> {
        let content = self.fs.read_to_string(&self.proc("net/dev"))?;
        parse_net_dev(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects static interface attributes from `/sys/class/net/*`.
    ///
    /// Missing attribute files leave the field at its default.
    pub fn interfaces(&self) -> Result<Vec<InterfaceInfo>, CollectError> {
        let mut dirs = self.fs.read_dir(&self.sys("class/net"))?;
        dirs.sort();

        let mut interfaces = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let attr = |file: &str| self.read_trimmed(&dir.join(file)).unwrap_or_default();
            interfaces.push(InterfaceInfo {
                mtu: attr("mtu").parse().unwrap_or(0),
                hardware_addr: attr("address"),
                oper_state: attr("operstate"),
                name,
            });
        }
        Ok(interfaces)
    }

    /// Counts TCP sockets by address family and state.
    ///
    /// Keys are `("tcp4" | "tcp6", state)`. Sockets without a state (`NONE`)
    /// are skipped. A missing `tcp6` table (IPv6 disabled) is not an error.
    pub fn connections(&self) -> Result<BTreeMap<(String, String), u64>, CollectError> {
        let mut counts = BTreeMap::new();
        let mut read_any = false;

        for (kind, file) in [("tcp4", "net/tcp"), ("tcp6", "net/tcp6")] {
            let content = match self.fs.read_to_string(&self.proc(file)) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            read_any = true;
            let states = parse_tcp_states(&content).map_err(|e| CollectError::Parse(e.message))?;
            for (state, count) in states {
                if state == "NONE" {
                    continue;
                }
                counts.insert((kind.to_string(), state.to_string()), count);
            }
        }

        if !read_any {
            return Err(CollectError::Unavailable("no TCP socket tables".to_string()));
        }
        Ok(counts)
    }

    /// Collects protocol counters from `/proc/net/snmp`.
    pub fn net_snmp(&self) -> Result<ProtoCounters, CollectError> {
        let content = self.fs.read_to_string(&self.proc("net/snmp"))?;
        parse_net_snmp(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects host description.
    ///
    /// Hostname, kernel release and uptime are required; distribution and
    /// virtualization details are best effort.
    pub fn host_info(&self) -> Result<HostInfo, CollectError> {
        let hostname = self.read_trimmed(&self.proc("sys/kernel/hostname"))?;
        let kernel_version = self.read_trimmed(&self.proc("sys/kernel/osrelease"))?;
        let uptime = parse_uptime(&self.fs.read_to_string(&self.proc("uptime"))?)
            .map_err(|e| CollectError::Parse(e.message))?;
        let boot_time = self.cpu_times().map(|s| s.btime as i64).unwrap_or(0);

        let release = self
            .fs
            .read_to_string(&PathBuf::from(format!("{}/os-release", self.paths.etc_path)))
            .map(|c| parse_os_release(&c))
            .unwrap_or_default();
        let (virtualization_system, virtualization_role) = self.virtualization();

        Ok(HostInfo {
            hostname,
            os: std::env::consts::OS.to_string(),
            platform: release.id,
            platform_family: release
                .id_like
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
            platform_version: release.version_id,
            kernel_version,
            kernel_arch: std::env::consts::ARCH.to_string(),
            boot_time,
            uptime,
            virtualization_system,
            virtualization_role,
        })
    }

    /// Detects container or hypervisor guests.
    fn virtualization(&self) -> (String, String) {
        let container_env = PathBuf::from(format!("{}/.containerenv", self.paths.run_path));
        if self.fs.exists(&container_env) {
            return ("podman".to_string(), "guest".to_string());
        }

        if let Ok(cgroup) = self.fs.read_to_string(&self.proc("1/cgroup")) {
            for (marker, system) in [
                ("docker", "docker"),
                ("kubepods", "kubernetes"),
                ("containerd", "containerd"),
                ("lxc", "lxc"),
            ] {
                if cgroup.contains(marker) {
                    return (system.to_string(), "guest".to_string());
                }
            }
        }

        if self.fs.exists(&self.proc("xen")) {
            return ("xen".to_string(), "guest".to_string());
        }

        if let Ok(cpuinfo) = self.fs.read_to_string(&self.proc("cpuinfo"))
            && cpuinfo
                .lines()
                .any(|l| l.starts_with("flags") && l.split_whitespace().any(|f| f == "hypervisor"))
        {
            return ("hypervisor".to_string(), "guest".to_string());
        }

        (String::new(), String::new())
    }

    /// Collects thermal zone readings from `/sys/class/thermal`.
    ///
    /// Zones sharing a type get a numeric suffix so every key is unique.
    pub fn temperatures(&self) -> Result<Vec<Temperature>, CollectError> {
        let mut zones: Vec<PathBuf> = self
            .fs
            .read_dir(&self.sys("class/thermal"))?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with("thermal_zone"))
            })
            .collect();
        zones.sort();

        let mut readings = Vec::new();
        let mut seen: HashMap<String, u32> = HashMap::new();
        for zone in zones {
            let Ok(raw) = self.fs.read_to_string(&zone.join("temp")) else {
                continue;
            };
            let Ok(celsius) = parse_thermal_temp(&raw) else {
                continue;
            };
            let kind = self
                .read_trimmed(&zone.join("type"))
                .unwrap_or_else(|_| "thermal".to_string());
            let n = seen.entry(kind.clone()).or_insert(0);
            let sensor_key = if *n == 0 {
                kind.clone()
            } else {
                format!("{}_{}", kind, n)
            };
            *n += 1;
            readings.push(Temperature {
                sensor_key,
                celsius,
            });
        }
        Ok(readings)
    }

    /// Collects logged-in user sessions from utmp.
    pub fn users(&self) -> Result<Vec<UtmpEntry>, CollectError> {
        let content = self.fs.read(Path::new(&self.paths.utmp_path))?;
        parse_utmp(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Collects processes whose `comm` is one of `names`.
    ///
    /// Processes that exit while being read are skipped.
    pub fn processes(&self, names: &[String]) -> Result<Vec<ProcessInfo>, CollectError> {
        let mut found = Vec::new();
        if names.is_empty() {
            return Ok(found);
        }

        let mut entries = self.fs.read_dir(Path::new(&self.paths.proc_path))?;
        entries.sort();
        for entry in entries {
            let Some(pid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let Ok(comm) = self.read_trimmed(&entry.join("comm")) else {
                continue;
            };
            if !names.iter().any(|n| *n == comm) {
                continue;
            }
            let Ok(stat) = self
                .fs
                .read_to_string(&entry.join("stat"))
                .map_err(CollectError::from)
                .and_then(|c| parse_proc_stat(&c).map_err(|e| CollectError::Parse(e.message)))
            else {
                continue;
            };
            found.push(ProcessInfo {
                name: comm,
                pid,
                rss_bytes: stat.rss.max(0) as u64 * PAGE_SIZE,
                vsize_bytes: stat.vsize,
                cpu_ticks: stat.utime + stat.stime,
                threads: stat.num_threads,
            });
        }
        Ok(found)
    }

    /// Reads the kernel hostname.
    pub fn hostname(&self) -> Result<String, CollectError> {
        self.read_trimmed(&self.proc("sys/kernel/hostname"))
    }

    /// Reads the systemd/dbus machine id.
    pub fn machine_id(&self) -> Result<String, CollectError> {
        self.read_trimmed(&PathBuf::from(format!("{}/machine-id", self.paths.etc_path)))
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
