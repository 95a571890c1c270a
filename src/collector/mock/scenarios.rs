//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc`, `/sys` and `/etc` states for
//! exercising the provider and the meters.

use super::filesystem::MockFs;
use crate::collector::traits::FsStat;

const GIB: u64 = 1024 * 1024 * 1024;

const MEMINFO_TYPICAL: &str = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
Writeback:             0 kB
Shmem:             65536 kB
Slab:             512000 kB
SReclaimable:     256000 kB
SUnreclaim:       256000 kB
PageTables:        40960 kB
Committed_AS:    6000000 kB
";

const CPUINFO_TYPICAL: &str = "\
processor\t: 0
vendor_id\t: AuthenticAMD
cpu family\t: 23
model\t\t: 49
model name\t: AMD EPYC 7B12
stepping\t: 0
microcode\t: 0x1000065
cpu MHz\t\t: 2249.998
cache size\t: 512 KB
physical id\t: 0
core id\t\t: 0
cpu cores\t: 2
flags\t\t: fpu vme de pse tsc msr hypervisor

processor\t: 1
vendor_id\t: AuthenticAMD
cpu family\t: 23
model\t\t: 49
model name\t: AMD EPYC 7B12
stepping\t: 0
microcode\t: 0x1000065
cpu MHz\t\t: 2249.998
cache size\t: 512 KB
physical id\t: 0
core id\t\t: 1
cpu cores\t: 2
flags\t\t: fpu vme de pse tsc msr hypervisor

processor\t: 2
vendor_id\t: AuthenticAMD
cpu family\t: 23
model\t\t: 49
model name\t: AMD EPYC 7B12
stepping\t: 0
microcode\t: 0x1000065
cpu MHz\t\t: 2249.998
cache size\t: 512 KB
physical id\t: 0
core id\t\t: 0
cpu cores\t: 2
flags\t\t: fpu vme de pse tsc msr hypervisor

processor\t: 3
vendor_id\t: AuthenticAMD
cpu family\t: 23
model\t\t: 49
model name\t: AMD EPYC 7B12
stepping\t: 0
microcode\t: 0x1000065
cpu MHz\t\t: 2249.998
cache size\t: 512 KB
physical id\t: 0
core id\t\t: 1
cpu cores\t: 2
flags\t\t: fpu vme de pse tsc msr hypervisor
";

/// Builds one glibc utmp record (384 bytes).
fn utmp_record(ut_type: i16, line: &str, user: &str, host: &str, tv_sec: i32) -> Vec<u8> {
    let mut record = vec![0u8; 384];
    record[0..2].copy_from_slice(&ut_type.to_ne_bytes());
    record[8..8 + line.len()].copy_from_slice(line.as_bytes());
    record[44..44 + user.len()].copy_from_slice(user.as_bytes());
    record[76..76 + host.len()].copy_from_slice(host.as_bytes());
    record[340..344].copy_from_slice(&tv_sec.to_ne_bytes());
    record
}

fn proc_stat_line(pid: u32, comm: &str, utime: u64, stime: u64, threads: u32, rss: u64) -> String {
    format!(
        "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194560 1000 0 0 0 {utime} {stime} 0 0 20 0 {threads} 0 5000 {vsize} {rss} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
        vsize = rss * 4096 * 4,
    )
}

impl MockFs {
    /// Creates a typical 4-vCPU Debian guest with two disks, one NIC, a few
    /// thermal zones, one logged-in user and a small postgres cluster.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        // Identity
        fs.add_file("/etc/machine-id", "4c4c4544004a4d10804ab7c04f4d4e32\n");
        fs.add_file("/proc/sys/kernel/hostname", "web-01\n");
        fs.add_file("/proc/sys/kernel/osrelease", "6.1.0-18-amd64\n");
        fs.add_file(
            "/etc/os-release",
            "\
PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"
NAME=\"Debian GNU/Linux\"
VERSION_ID=\"12\"
ID=debian
",
        );
        fs.add_file("/proc/uptime", "12345.67 98765.43\n");
        fs.add_file("/proc/1/cgroup", "0::/init.scope\n");

        // CPU and load
        fs.add_file("/proc/loadavg", "0.15 0.10 0.05 1/150 1234\n");
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );
        fs.add_file("/proc/cpuinfo", CPUINFO_TYPICAL);

        // Memory
        fs.add_file("/proc/meminfo", MEMINFO_TYPICAL);
        fs.add_file(
            "/proc/swaps",
            "\
Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority
/dev/sda2                               partition\t4096000\t\t0\t\t-2
",
        );

        // Disks
        fs.add_file(
            "/proc/self/mounts",
            "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev,size=1638400k,mode=755 0 0
cgroup2 /sys/fs/cgroup cgroup2 rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1 /data xfs rw,noatime 0 0
",
        );
        fs.add_mount_stat(
            "/",
            FsStat {
                block_size: 4096,
                blocks: 100 * GIB / 4096,
                blocks_free: 60 * GIB / 4096,
                blocks_avail: 55 * GIB / 4096,
                files: 6_553_600,
                files_free: 5_553_600,
            },
        );
        fs.add_mount_stat(
            "/data",
            FsStat {
                block_size: 4096,
                blocks: 500 * GIB / 4096,
                blocks_free: 400 * GIB / 4096,
                blocks_avail: 400 * GIB / 4096,
                files: 32_768_000,
                files_free: 32_000_000,
            },
        );
        fs.add_file(
            "/proc/diskstats",
            "\
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
",
        );

        // Network
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
",
        );
        for (name, mtu, addr, state) in [
            ("eth0", "1500", "52:54:00:12:34:56", "up"),
            ("lo", "65536", "00:00:00:00:00:00", "unknown"),
        ] {
            fs.add_file(format!("/sys/class/net/{}/mtu", name), format!("{}\n", mtu));
            fs.add_file(format!("/sys/class/net/{}/address", name), format!("{}\n", addr));
            fs.add_file(format!("/sys/class/net/{}/operstate", name), format!("{}\n", state));
        }
        fs.add_file(
            "/proc/net/tcp",
            "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1 1 0 100 0 0 10 0
   1: 0100007F:1538 00000000:0000 0A 00000000:00000000 00:00000000 00000000   111        0 2 1 0 100 0 0 10 0
   2: 0A00020F:0016 0A000202:D8F4 01 00000000:00000000 02:0009F2D5 00000000     0        0 3 4 0 20 4 30 10 -1
",
        );
        fs.add_file(
            "/proc/net/tcp6",
            "\
  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000000000000:0016 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 4 1 0 100 0 0 10 0
",
        );
        fs.add_file(
            "/proc/net/snmp",
            "\
Ip: Forwarding DefaultTTL InReceives InHdrErrors OutRequests
Ip: 1 64 123456 0 120000
Icmp: InMsgs InErrors OutMsgs
Icmp: 45 0 45
Tcp: RtoAlgorithm RtoMin RtoMax MaxConn ActiveOpens PassiveOpens CurrEstab InSegs OutSegs RetransSegs
Tcp: 1 200 120000 -1 500 300 12 100000 95000 40
Udp: InDatagrams NoPorts InErrors OutDatagrams
Udp: 1000 3 0 900
",
        );

        // Thermal zones and a cooling device that must be ignored
        for (zone, kind, milli) in [
            ("thermal_zone0", "acpitz", "40000"),
            ("thermal_zone1", "acpitz", "41000"),
            ("thermal_zone2", "x86_pkg_temp", "52000"),
        ] {
            fs.add_file(format!("/sys/class/thermal/{}/type", zone), format!("{}\n", kind));
            fs.add_file(format!("/sys/class/thermal/{}/temp", zone), format!("{}\n", milli));
        }
        fs.add_file("/sys/class/thermal/cooling_device0/type", "Processor\n");

        // Sessions: boot record, one user, one dead process
        let mut utmp = utmp_record(2, "~", "reboot", "6.1.0-18-amd64", 1_700_000_000);
        utmp.extend(utmp_record(7, "pts/0", "alice", "10.0.0.5", 1_700_000_100));
        utmp.extend(utmp_record(8, "pts/1", "", "", 1_700_000_200));
        fs.add_binary("/var/run/utmp", utmp);

        // Processes
        fs.add_process(
            1,
            &proc_stat_line(1, "systemd", 300, 200, 1, 3000),
            "Name:\tsystemd\nPid:\t1\n",
            "systemd\n",
        );
        fs.add_process(
            1200,
            &proc_stat_line(1200, "postgres", 100, 50, 1, 2500),
            "Name:\tpostgres\nPid:\t1200\n",
            "postgres\n",
        );
        fs.add_process(
            1201,
            &proc_stat_line(1201, "postgres", 40, 10, 1, 1500),
            "Name:\tpostgres\nPid:\t1201\n",
            "postgres\n",
        );
        fs.add_process(
            1300,
            &proc_stat_line(1300, "nginx", 70, 30, 4, 1000),
            "Name:\tnginx\nPid:\t1300\n",
            "nginx\n",
        );

        fs
    }

    /// Creates a system under memory pressure: low free memory and swap in use.
    pub fn memory_pressure() -> Self {
        let mut fs = Self::typical_system();
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:          256000 kB
MemAvailable:     512000 kB
Buffers:           32000 kB
Cached:           256000 kB
SwapCached:       100000 kB
SwapTotal:       4096000 kB
SwapFree:        1024000 kB
Slab:             512000 kB
SReclaimable:     128000 kB
",
        );
        fs.add_file(
            "/proc/swaps",
            "\
Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority
/dev/sda2                               partition\t4096000\t\t3072000\t\t-2
",
        );
        fs
    }

    /// Creates a system where every optional source is missing.
    ///
    /// Only the files required to resolve a host identity remain, so every
    /// meter degrades to zero-valued samples.
    pub fn bare_system() -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/sys/kernel/hostname", "bare\n");
        fs.add_dir("/proc");
        fs.add_dir("/sys/class/net");
        fs
    }
}
