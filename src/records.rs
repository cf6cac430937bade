//! Binary schemas of the gossiped table values.
//!
//! Both tables store protobuf-encoded records.  Fields we do not model
//! are skipped by `prost` when decoding.

/// Endpoint specific information gossiped to every node on the network.
#[derive(Clone, PartialEq, prost::Message)]
pub struct EndpointRecord {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub service_name: String,
    #[prost(string, tag = "3")]
    pub service_id: String,
    #[prost(string, tag = "4")]
    pub virtual_ip: String,
    #[prost(string, tag = "5")]
    pub endpoint_ip: String,
    #[prost(message, repeated, tag = "6")]
    pub ingress_ports: Vec<PortConfig>,
    #[prost(string, repeated, tag = "7")]
    pub aliases: Vec<String>,
    #[prost(string, repeated, tag = "8")]
    pub task_aliases: Vec<String>,
    #[prost(bool, tag = "9")]
    pub service_disabled: bool,
}

/// A port exposed by the service an endpoint belongs to.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PortConfig {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "Protocol", tag = "2")]
    pub protocol: i32,
    #[prost(uint32, tag = "3")]
    pub target_port: u32,
    #[prost(uint32, tag = "4")]
    pub published_port: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Protocol {
    Tcp = 0,
    Udp = 1,
    Sctp = 2,
}

/// Overlay peer membership record.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PeerRecord {
    #[prost(string, tag = "1")]
    pub endpoint_ip: String,
    #[prost(string, tag = "2")]
    pub endpoint_mac: String,
    #[prost(string, tag = "3")]
    pub tunnel_endpoint_ip: String,
}
