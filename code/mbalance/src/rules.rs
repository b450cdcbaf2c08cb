// Turn a rebalancing plan into forwarding rules for the OpenFlow controller in front of the
// key-value servers.
//
// In direct mode, every hot key that moves gets a rule rewriting the destination of its requests
// to the target server's MAC and IP and forwarding them out of that server's switch port.  In
// group mode, a select group spanning all the servers is installed and every hot key gets a rule
// sending its requests to the group, which lets the switch spread them.
//
// Either way the servers that will receive a hot key's requests must hold its value, so before any
// rule is installed the value is copied from the key's current server to every server, if there
// is a key store to do it with.
//
// The controller and the key store are reached through the traits below.  The rule bodies are
// JSON in the controller's schema.

use crate::rebalance::RebalancePlan;

use anyhow::{bail, Result};
use rustutils::SwitchPort;
use serde_json::{json, Value};
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};
use ustr::Ustr;

pub const KEY_RULE_PRIORITY: u32 = 2;
pub const SELECT_GROUP_ID: u32 = 5;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("IP address {0} not found in switch ports")]
    UnknownSwitchPort(String),

    #[error("Key {key} not found in server {server}")]
    MissingHotKeyValue { key: String, server: String },
}

pub trait Controller {
    /// The switch's port table.
    fn switch_ports(&mut self) -> Result<Vec<SwitchPort>>;

    fn add_group(&mut self, body: &Value) -> Result<()>;

    fn add_key_rule(&mut self, body: &Value) -> Result<()>;
}

pub trait KeyStore {
    /// The value of `key` on `server` (a roster entry), None if it has none.
    fn get(&mut self, server: &str, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&mut self, server: &str, key: &str, value: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Forward {
        mac: String,
        ip_address: String,
        port: u32,
    },
    Group(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRule {
    pub key: Ustr,
    pub action: RuleAction,
}

impl KeyRule {
    pub fn body(&self) -> Value {
        let actions = match self.action {
            RuleAction::Forward {
                ref mac,
                ref ip_address,
                port,
            } => forward_actions(mac, ip_address, port),
            RuleAction::Group(group_id) => json!([{ "OFPActionGroup": { "group_id": group_id } }]),
        };
        json!({
            "KeyReq": {
                "priority": KEY_RULE_PRIORITY,
                "key": self.key.as_str(),
                "command": "ADD",
                "match": {},
                "instructions": {
                    "OFPInstructionActions": {
                        "type": "OFPIT_APPLY_ACTIONS",
                        "actions": actions
                    }
                }
            }
        })
    }
}

fn forward_actions(mac: &str, ip_address: &str, port: u32) -> Value {
    json!([
        { "OFPActionSetField": { "eth_dst": mac } },
        { "OFPActionSetField": { "ipv4_dst": ip_address } },
        { "OFPActionOutput": { "port": port } }
    ])
}

/// The host part of a `host:port` roster entry.

pub fn server_host(server: &str) -> &str {
    server.split_once(':').map_or(server, |(host, _)| host)
}

fn roster_entry(roster: &[String], index: usize) -> Result<&str> {
    match roster.get(index) {
        Some(s) => Ok(s.as_str()),
        None => bail!("Server index {index} not in roster of {} servers", roster.len()),
    }
}

/// Rules for the hot keys that move, forwarding them to their target's port.

pub fn direct_rules(
    plan: &RebalancePlan,
    roster: &[String],
    ports: &[SwitchPort],
) -> Result<Vec<KeyRule>> {
    let mut rules = vec![];
    for a in plan.assignments.iter().filter(|a| a.moves()) {
        let ip = server_host(roster_entry(roster, a.target)?);
        let mut matching = ports.iter().filter(|p| p.ip_address == ip);
        let (Some(port), None) = (matching.next(), matching.next()) else {
            return Err(RuleError::UnknownSwitchPort(ip.to_string()).into());
        };
        debug!(key = a.key.as_str(), mac = port.mac.as_str(), ip, port = port.port, "direct rule");
        rules.push(KeyRule {
            key: a.key,
            action: RuleAction::Forward {
                mac: port.mac.clone(),
                ip_address: ip.to_string(),
                port: port.port,
            },
        });
    }
    Ok(rules)
}

/// The ports of the servers in the roster, in port table order.

pub fn roster_ports<'a>(roster: &[String], ports: &'a [SwitchPort]) -> Vec<&'a SwitchPort> {
    ports
        .iter()
        .filter(|p| roster.iter().any(|s| server_host(s) == p.ip_address))
        .collect()
}

pub fn select_group_body(ports: &[&SwitchPort], group_id: u32) -> Value {
    let buckets = ports
        .iter()
        .map(|p| json!({ "actions": forward_actions(&p.mac, &p.ip_address, p.port) }))
        .collect::<Vec<Value>>();
    json!({
        "OFPGroupMod": {
            "command": "OFPGC_ADD",
            "type": "OFPGT_SELECT",
            "group_id": group_id,
            "buckets": buckets
        }
    })
}

/// Rules sending every hot key to the group, whether it moves or not.

pub fn group_rules(plan: &RebalancePlan, group_id: u32) -> Vec<KeyRule> {
    plan.assignments
        .iter()
        .map(|a| KeyRule {
            key: a.key,
            action: RuleAction::Group(group_id),
        })
        .collect()
}

/// Copy every hot key's value from its current server to all the servers.

pub fn replicate_hot_keys(
    store: &mut dyn KeyStore,
    plan: &RebalancePlan,
    roster: &[String],
) -> Result<()> {
    for a in &plan.assignments {
        let source = roster_entry(roster, a.current)?;
        let Some(value) = store.get(source, a.key.as_str())? else {
            return Err(RuleError::MissingHotKeyValue {
                key: a.key.to_string(),
                server: source.to_string(),
            }
            .into());
        };
        for server in roster {
            debug!(key = a.key.as_str(), server = server.as_str(), "copying hot key");
            store.set(server, a.key.as_str(), &value)?;
        }
    }
    Ok(())
}

/// Replicate the hot keys and install the rules for the plan.  Returns the rules that were
/// installed.

pub fn emit_rules(
    controller: &mut dyn Controller,
    store: Option<&mut dyn KeyStore>,
    plan: &RebalancePlan,
    roster: &[String],
    use_group: bool,
) -> Result<Vec<KeyRule>> {
    match store {
        Some(store) => replicate_hot_keys(store, plan, roster)?,
        None => warn!("No key store, hot key values are not copied to the servers"),
    }

    let ports = controller.switch_ports()?;
    let rules = if use_group {
        let group_ports = roster_ports(roster, &ports);
        info!(ports = group_ports.len(), group = SELECT_GROUP_ID, "adding select group");
        controller.add_group(&select_group_body(&group_ports, SELECT_GROUP_ID))?;
        group_rules(plan, SELECT_GROUP_ID)
    } else {
        direct_rules(plan, roster, &ports)?
    };
    for rule in &rules {
        controller.add_key_rule(&rule.body())?;
    }
    info!(rules = rules.len(), "added key rules");
    Ok(rules)
}

/// A controller that takes its port table from a file and writes the request bodies to a stream,
/// one JSON object per line, instead of sending them.

pub struct DryRunController<'a> {
    ports: Vec<SwitchPort>,
    output: &'a mut dyn io::Write,
}

impl<'a> DryRunController<'a> {
    pub fn new(ports: Vec<SwitchPort>, output: &'a mut dyn io::Write) -> DryRunController<'a> {
        DryRunController { ports, output }
    }

    fn write_body(&mut self, body: &Value) -> Result<()> {
        serde_json::to_writer(&mut *self.output, body)?;
        self.output.write_all(b"\n")?;
        Ok(())
    }
}

impl<'a> Controller for DryRunController<'a> {
    fn switch_ports(&mut self) -> Result<Vec<SwitchPort>> {
        Ok(self.ports.clone())
    }

    fn add_group(&mut self, body: &Value) -> Result<()> {
        self.write_body(body)
    }

    fn add_key_rule(&mut self, body: &Value) -> Result<()> {
        self.write_body(body)
    }
}

#[cfg(test)]
use crate::rebalance::Reassignment;
#[cfg(test)]
use std::collections::HashMap;

#[cfg(test)]
fn test_setup() -> (RebalancePlan, Vec<String>, Vec<SwitchPort>) {
    let assignment = |key: &str, current, target| Reassignment {
        key: Ustr::from(key),
        count: 10,
        current,
        target,
    };
    let plan = RebalancePlan {
        assignments: vec![assignment("a", 0, 0), assignment("b", 0, 1), assignment("c", 1, 2)],
        projected_loads: vec![30, 30, 30],
    };
    let roster = vec![
        "10.0.0.1:11211".to_string(),
        "10.0.0.2:11211".to_string(),
        "10.0.0.3:11211".to_string(),
    ];
    let ports = rustutils::read_switch_ports("../tests/rustutils/switch-ports.json").unwrap();
    (plan, roster, ports)
}

#[cfg(test)]
#[derive(Default)]
struct MemoryStore {
    values: HashMap<(String, String), Vec<u8>>,
}

#[cfg(test)]
impl KeyStore for MemoryStore {
    fn get(&mut self, server: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.get(&(server.to_string(), key.to_string())).cloned())
    }

    fn set(&mut self, server: &str, key: &str, value: &[u8]) -> Result<()> {
        self.values.insert((server.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }
}

#[test]
fn test_key_rule_body() {
    let rule = KeyRule {
        key: Ustr::from("k"),
        action: RuleAction::Forward {
            mac: "00:00:00:00:00:02".to_string(),
            ip_address: "10.0.0.2".to_string(),
            port: 2,
        },
    };
    let body = rule.body();
    assert!(body["KeyReq"]["priority"] == 2);
    assert!(body["KeyReq"]["key"] == "k");
    assert!(body["KeyReq"]["command"] == "ADD");
    assert!(body["KeyReq"]["match"] == json!({}));
    let instr = &body["KeyReq"]["instructions"]["OFPInstructionActions"];
    assert!(instr["type"] == "OFPIT_APPLY_ACTIONS");
    assert!(instr["actions"][0]["OFPActionSetField"]["eth_dst"] == "00:00:00:00:00:02");
    assert!(instr["actions"][1]["OFPActionSetField"]["ipv4_dst"] == "10.0.0.2");
    assert!(instr["actions"][2]["OFPActionOutput"]["port"] == 2);

    let rule = KeyRule {
        key: Ustr::from("k"),
        action: RuleAction::Group(5),
    };
    let body = rule.body();
    let actions = &body["KeyReq"]["instructions"]["OFPInstructionActions"]["actions"];
    assert!(*actions == json!([{ "OFPActionGroup": { "group_id": 5 } }]));
}

#[test]
fn test_direct_rules() {
    let (plan, roster, ports) = test_setup();
    let rules = direct_rules(&plan, &roster, &ports).unwrap();
    // "a" stays put
    assert!(rules.len() == 2);
    assert!(rules[0].key.as_str() == "b");
    assert!(
        rules[0].action
            == RuleAction::Forward {
                mac: "00:00:00:00:00:02".to_string(),
                ip_address: "10.0.0.2".to_string(),
                port: 2
            }
    );
    assert!(rules[1].key.as_str() == "c");

    let err = direct_rules(&plan, &roster, &ports[0..2]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RuleError>(),
        Some(RuleError::UnknownSwitchPort(ip)) if ip == "10.0.0.3"
    ));
}

#[test]
fn test_group_rules() {
    let (plan, roster, ports) = test_setup();
    let group_ports = roster_ports(&roster[0..2], &ports);
    assert!(group_ports.len() == 2);
    let body = select_group_body(&group_ports, SELECT_GROUP_ID);
    assert!(body["OFPGroupMod"]["type"] == "OFPGT_SELECT");
    assert!(body["OFPGroupMod"]["command"] == "OFPGC_ADD");
    assert!(body["OFPGroupMod"]["group_id"] == 5);
    assert!(body["OFPGroupMod"]["buckets"].as_array().unwrap().len() == 2);
    assert!(body["OFPGroupMod"]["buckets"][1]["actions"][2]["OFPActionOutput"]["port"] == 2);

    let rules = group_rules(&plan, SELECT_GROUP_ID);
    assert!(rules.len() == 3);
    assert!(rules.iter().all(|r| r.action == RuleAction::Group(5)));
}

#[test]
fn test_replicate_hot_keys() {
    let (plan, roster, _) = test_setup();
    let mut store = MemoryStore::default();
    store.set("10.0.0.1:11211", "a", b"va").unwrap();
    store.set("10.0.0.1:11211", "b", b"vb").unwrap();
    store.set("10.0.0.2:11211", "c", b"vc").unwrap();
    replicate_hot_keys(&mut store, &plan, &roster).unwrap();
    for server in &roster {
        assert!(store.get(server, "c").unwrap() == Some(b"vc".to_vec()));
        assert!(store.get(server, "a").unwrap() == Some(b"va".to_vec()));
    }

    let mut store = MemoryStore::default();
    store.set("10.0.0.1:11211", "a", b"va").unwrap();
    let err = replicate_hot_keys(&mut store, &plan, &roster).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RuleError>(),
        Some(RuleError::MissingHotKeyValue { key, .. }) if key == "b"
    ));
}

#[test]
fn test_emit_rules_dry_run() {
    let (plan, roster, ports) = test_setup();
    let mut out = Vec::<u8>::new();
    {
        let mut controller = DryRunController::new(ports.clone(), &mut out);
        let rules = emit_rules(&mut controller, None, &plan, &roster, false).unwrap();
        assert!(rules.len() == 2);
    }
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 2);
    let first: Value = serde_json::from_str(lines[0]).unwrap();
    assert!(first["KeyReq"]["key"] == "b");

    let mut out = Vec::<u8>::new();
    {
        let mut controller = DryRunController::new(ports, &mut out);
        let rules = emit_rules(&mut controller, None, &plan, &roster, true).unwrap();
        assert!(rules.len() == 3);
    }
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 4);
    let group: Value = serde_json::from_str(lines[0]).unwrap();
    assert!(group["OFPGroupMod"]["buckets"].as_array().unwrap().len() == 3);
}
