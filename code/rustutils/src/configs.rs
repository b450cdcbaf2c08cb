/// Read the port table of an OpenFlow switch from a json file.
///
/// See ../tests/rustutils/switch-ports.json for an example.
///
/// File format:
///
/// An array [...] of objects { ... }, each with the following named fields and value types:
///
///   ip_address - string, the IPv4 address of the host attached to the port
///   mac - string, the MAC address of the host attached to the port
///   port - integer, the switch port number
///   description - string, optional, arbitrary text describing the host
///
/// Any field name starting with '#' is reserved for arbitrary comments.

use anyhow::{bail, Result};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path;

// See above comment block for field documentation.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SwitchPort {
    pub ip_address: String,
    pub mac: String,
    pub port: u32,
    pub description: String,
}

/// The table is produced by hand or by dumping it from the controller, so the generic JSON parser
/// is used followed by explicit decoding of the fields, rather than a (derived) strongly-typed
/// parser.

pub fn read_switch_ports(filename: &str) -> Result<Vec<SwitchPort>> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    decode_switch_ports(&v)
}

/// Decode a table that has already been parsed as JSON, eg, a controller response.

pub fn decode_switch_ports(v: &Value) -> Result<Vec<SwitchPort>> {
    let Value::Array(objs) = v else {
        bail!("Expected an array value")
    };
    let mut ports = vec![];
    for obj in objs {
        let Value::Object(fields) = obj else {
            bail!("Expected an object value")
        };
        let port = SwitchPort {
            ip_address: grab_string(fields, "ip_address")?,
            mac: grab_string(fields, "mac")?,
            port: grab_u32(fields, "port")?,
            description: grab_string_opt(fields, "description")?,
        };
        if ports.iter().any(|p: &SwitchPort| p.ip_address == port.ip_address) {
            bail!("Switch port for {} already defined", port.ip_address);
        }
        ports.push(port);
    }
    Ok(ports)
}

fn grab_string(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    if let Some(Value::String(s)) = fields.get(name) {
        Ok(s.to_string())
    } else {
        bail!("Field '{name}' must be present and have a string value");
    }
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(s.to_string()),
        Some(_) => bail!("Field '{name}' must have a string value"),
        None => Ok("".to_string()),
    }
}

fn grab_u32(fields: &serde_json::Map<String, Value>, name: &str) -> Result<u32> {
    if let Some(Value::Number(n)) = fields.get(name) {
        if let Some(n) = n.as_u64().and_then(|n| u32::try_from(n).ok()) {
            return Ok(n);
        }
    }
    bail!("Field '{name}' must be present and have an unsigned integer value")
}

#[test]
fn test_switch_ports() {
    let ports = read_switch_ports("../tests/rustutils/switch-ports.json").unwrap();
    assert!(ports.len() == 3);
    assert!(ports[0].ip_address == "10.0.0.1");
    assert!(ports[0].mac == "00:00:00:00:00:01");
    assert!(ports[0].port == 1);
    assert!(ports[0].description == "memcached server 0");
    assert!(ports[2].ip_address == "10.0.0.3");
    assert!(ports[2].port == 3);
    assert!(ports[2].description == "");
}

#[test]
fn test_switch_ports_errors() {
    use serde_json::json;

    assert!(decode_switch_ports(&json!({"ip_address": "10.0.0.1"})).is_err());
    assert!(decode_switch_ports(&json!([{"ip_address": "10.0.0.1", "mac": "m"}])).is_err());
    assert!(decode_switch_ports(&json!([{"ip_address": "10.0.0.1", "mac": "m", "port": -1}])).is_err());
    assert!(decode_switch_ports(&json!([{"ip_address": "10.0.0.1", "mac": "m", "port": "1"}])).is_err());
    assert!(decode_switch_ports(&json!([
        {"ip_address": "10.0.0.1", "mac": "m", "port": 1},
        {"ip_address": "10.0.0.1", "mac": "n", "port": 2}
    ]))
    .is_err());
    assert!(decode_switch_ports(&json!([])).unwrap().is_empty());
}
