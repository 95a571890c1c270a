//! Network interfaces, TCP connection states and protocol counters.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::collector::procfs::InterfaceInfo;
use crate::collector::procfs::parser::{NetDevStats, ProtoCounters};
use crate::collector::{CollectError, FileSystem, SystemCollector};
use crate::meter::{Family, KeyedStats, MeterCore, RecordContext, Sample, per_second};
use crate::storage::{RecordSet, StoreError};

pub type NetworkMeter<F> = MeterCore<Network<F>>;

const IO_SERIES: &[&str] = &[
    "bytes_recv",
    "bytes_sent",
    "packets_recv",
    "packets_sent",
    "err_in",
    "err_out",
    "drop_in",
    "drop_out",
];

/// Per-second traffic of one interface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceIo {
    pub name: String,
    pub bytes_recv: f64,
    pub bytes_sent: f64,
    pub packets_recv: f64,
    pub packets_sent: f64,
    pub err_in: f64,
    pub err_out: f64,
    pub drop_in: f64,
    pub drop_out: f64,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkSample {
    pub interfaces: Vec<InterfaceInfo>,
    pub io: Vec<InterfaceIo>,
    /// Socket counts keyed by `(kind, state)`.
    pub connections: BTreeMap<(String, String), u64>,
    pub protocols: ProtoCounters,
}

type Counters = BTreeMap<String, NetDevStats>;

pub struct Network<F: FileSystem> {
    collector: SystemCollector<F>,
    previous: Option<(Instant, Counters)>,
}

impl<F: FileSystem> Network<F> {
    pub fn new(collector: SystemCollector<F>) -> Self {
        Self {
            collector,
            previous: None,
        }
    }

    fn counters(&self) -> Result<Counters, CollectError> {
        Ok(self
            .collector
            .net_dev()?
            .into_iter()
            .map(|d| (d.interface.clone(), d))
            .collect())
    }

    fn io(&mut self) -> Vec<InterfaceIo> {
        let now = Instant::now();
        let current = match self.counters() {
            Ok(current) => current,
            Err(e) => {
                warn!(meter = "network", error = %e, "interface counters unavailable");
                return Vec::new();
            }
        };
        let io = match &self.previous {
            Some((at, previous)) => {
                let elapsed = now.duration_since(*at).as_secs_f64();
                current
                    .values()
                    .filter_map(|c| {
                        previous
                            .get(&c.interface)
                            .map(|p| interface_io(p, c, elapsed))
                    })
                    .collect()
            }
            None => Vec::new(),
        };
        self.previous = Some((now, current));
        io
    }
}

/// Rates between two reads of the same interface.
pub fn interface_io(previous: &NetDevStats, current: &NetDevStats, elapsed_secs: f64) -> InterfaceIo {
    let rate = |p: u64, c: u64| per_second(p, c, elapsed_secs);
    InterfaceIo {
        name: current.interface.clone(),
        bytes_recv: rate(previous.rx_bytes, current.rx_bytes),
        bytes_sent: rate(previous.tx_bytes, current.tx_bytes),
        packets_recv: rate(previous.rx_packets, current.rx_packets),
        packets_sent: rate(previous.tx_packets, current.tx_packets),
        err_in: rate(previous.rx_errs, current.rx_errs),
        err_out: rate(previous.tx_errs, current.tx_errs),
        drop_in: rate(previous.rx_drop, current.rx_drop),
        drop_out: rate(previous.tx_drop, current.tx_drop),
    }
}

impl<F: FileSystem + 'static> Family for Network<F> {
    const NAME: &'static str = "network";
    type Sample = NetworkSample;

    fn start(&mut self) -> Result<(), CollectError> {
        match self.counters() {
            Ok(counters) => self.previous = Some((Instant::now(), counters)),
            Err(e) => debug!(meter = Self::NAME, error = %e, "no interface baseline"),
        }
        Ok(())
    }

    fn sample(&mut self) -> NetworkSample {
        let interfaces = self.collector.interfaces().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "interfaces unavailable");
            Vec::new()
        });
        let io = self.io();
        let connections = self.collector.connections().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "connections unavailable");
            BTreeMap::new()
        });
        let protocols = self.collector.net_snmp().unwrap_or_else(|e| {
            warn!(meter = Self::NAME, error = %e, "protocol counters unavailable");
            ProtoCounters::new()
        });
        NetworkSample {
            interfaces,
            io,
            connections,
            protocols,
        }
    }

    fn records(
        &self,
        ctx: &RecordContext<'_>,
        samples: &[Sample<NetworkSample>],
    ) -> Result<Vec<RecordSet>, StoreError> {
        let mut io: KeyedStats<String> = KeyedStats::new();
        let mut connections: KeyedStats<(String, String)> = KeyedStats::new();
        let mut protocols: KeyedStats<(String, String)> = KeyedStats::new();

        for s in samples {
            for i in &s.data.interfaces {
                io.entry(i.name.clone());
            }
            for i in &s.data.io {
                let stats = io.entry(i.name.clone());
                stats.add("bytes_recv", i.bytes_recv);
                stats.add("bytes_sent", i.bytes_sent);
                stats.add("packets_recv", i.packets_recv);
                stats.add("packets_sent", i.packets_sent);
                stats.add("err_in", i.err_in);
                stats.add("err_out", i.err_out);
                stats.add("drop_in", i.drop_in);
                stats.add("drop_out", i.drop_out);
            }
            for (key, count) in &s.data.connections {
                connections.entry(key.clone()).add("count", *count as f64);
            }
            for (protocol, counters) in &s.data.protocols {
                for (counter, value) in counters {
                    protocols
                        .entry((protocol.clone(), counter.clone()))
                        .add("value", *value as f64);
                }
            }
        }

        let latest = samples.last().map(|s| &s.data);

        let mut interfaces = RecordSet::new("net_interfaces");
        for (name, stats) in io.iter() {
            let info = latest.and_then(|d| d.interfaces.iter().find(|i| &i.name == name));
            interfaces.push(
                ctx.row()
                    .with("name", name.as_str())
                    .with("mtu", info.map(|i| i.mtu).unwrap_or(0))
                    .with(
                        "hardware_addr",
                        info.map(|i| i.hardware_addr.as_str()).unwrap_or_default(),
                    )
                    .with(
                        "oper_state",
                        info.map(|i| i.oper_state.as_str()).unwrap_or_default(),
                    )
                    .stats(stats, IO_SERIES),
            )?;
        }

        let mut sockets = RecordSet::new("net_connections");
        for ((kind, state), stats) in connections.iter() {
            sockets.push(
                ctx.row()
                    .with("kind", kind.as_str())
                    .with("state", state.as_str())
                    .stat("count", &stats.get("count")),
            )?;
        }

        let mut counters = RecordSet::new("net_protocols");
        for ((protocol, counter), stats) in protocols.iter() {
            counters.push(
                ctx.row()
                    .with("protocol", protocol.as_str())
                    .with("counter", counter.as_str())
                    .stat("value", &stats.get("value")),
            )?;
        }

        Ok(vec![interfaces, sockets, counters])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, ProviderPaths};
    use crate::meter::core::testing::{context, float, table, take_samples};
    use crate::storage::Value;

    fn records(fs: MockFs) -> Vec<RecordSet> {
        let mut net = Network::new(SystemCollector::new(fs, ProviderPaths::default()));
        net.start().unwrap();
        let samples = take_samples(&mut net, 2);
        net.records(&context(), &samples).unwrap()
    }

    #[test]
    fn test_interface_io_rates() {
        let previous = NetDevStats {
            interface: "eth0".to_string(),
            rx_bytes: 1000,
            tx_packets: 10,
            ..NetDevStats::default()
        };
        let current = NetDevStats {
            interface: "eth0".to_string(),
            rx_bytes: 5000,
            tx_packets: 30,
            ..NetDevStats::default()
        };
        let io = interface_io(&previous, &current, 4.0);
        assert_eq!(io.bytes_recv, 1000.0);
        assert_eq!(io.packets_sent, 5.0);
        assert_eq!(io.drop_in, 0.0);
    }

    #[test]
    fn test_counter_reset_is_not_negative() {
        let previous = NetDevStats {
            rx_bytes: 5000,
            ..NetDevStats::default()
        };
        let io = interface_io(&previous, &NetDevStats::default(), 1.0);
        assert_eq!(io.bytes_recv, 0.0);
    }

    #[test]
    fn test_interfaces_carry_attributes() {
        let sets = records(MockFs::typical_system());
        let interfaces = table(&sets, "net_interfaces");
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces.get(0, "name"), Some(&Value::Text("eth0".to_string())));
        assert_eq!(interfaces.get(0, "mtu"), Some(&Value::Int(1500)));
        assert_eq!(
            interfaces.get(0, "hardware_addr"),
            Some(&Value::Text("52:54:00:12:34:56".to_string()))
        );
        assert_eq!(interfaces.get(1, "oper_state"), Some(&Value::Text("unknown".to_string())));
        assert_eq!(float(interfaces, 0, "bytes_recv_max"), 0.0);
    }

    #[test]
    fn test_connections_by_kind_and_state() {
        let sets = records(MockFs::typical_system());
        let sockets = table(&sets, "net_connections");
        assert_eq!(sockets.len(), 3);
        assert_eq!(sockets.get(0, "kind"), Some(&Value::Text("tcp4".to_string())));
        assert_eq!(sockets.get(0, "state"), Some(&Value::Text("ESTABLISHED".to_string())));
        assert_eq!(float(sockets, 0, "count_avg"), 1.0);
        assert_eq!(sockets.get(1, "state"), Some(&Value::Text("LISTEN".to_string())));
        assert_eq!(float(sockets, 1, "count_max"), 2.0);
        assert_eq!(sockets.get(2, "kind"), Some(&Value::Text("tcp6".to_string())));
    }

    #[test]
    fn test_protocol_counters_long_format() {
        let sets = records(MockFs::typical_system());
        let counters = table(&sets, "net_protocols");
        let row = (0..counters.len())
            .find(|&r| {
                counters.get(r, "protocol") == Some(&Value::Text("tcp".to_string()))
                    && counters.get(r, "counter") == Some(&Value::Text("RetransSegs".to_string()))
            })
            .unwrap();
        assert_eq!(float(counters, row, "value_avg"), 40.0);
        assert_eq!(float(counters, row, "value_min"), 40.0);
    }

    #[test]
    fn test_bare_system_yields_empty_sets() {
        let sets = records(MockFs::bare_system());
        assert!(sets.iter().all(|s| s.is_empty()));
    }
}
