//! # Plugins
//!
//! Named fact transformations, applied to fixtures before they are written.
//!
//! A plugin receives one fact as its own `FactRecord`, the argument map of
//! the rule that invoked it, and all of the node's facts as they were before
//! the plugin ran, the edited fact included. Plugins live in an
//! explicit `PluginRegistry` value; there is no process-wide registry.
//!
//! Every built-in accepts an optional `structure` argument (text path or
//! structured path) addressing a part of a structured fact.
//!
//! ## Determinism
//!
//! The randomizing plugins seed a splitmix64 generator from their input, so
//! the same input always maps to the same output and fixtures stay stable
//! across regenerations.

use crate::export::fnv1a;
use crate::path::Path;
use crate::record::{FactRecord, FactSelector};
use crate::transform::Transform;
use crate::{FactMap, FactdexError, Value};
use regex::Regex;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A plugin: `(fact, args, node_facts)`.
pub type Plugin = Box<dyn Fn(&mut FactRecord, &FactMap, &FactMap) -> Result<(), FactdexError>>;

/// Plugin run when a rule names none.
pub const DEFAULT_PLUGIN: &str = "noop";

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// =============================================================================
// REGISTRY
// =============================================================================

/// Plugins by name.
pub struct PluginRegistry {
    plugins: BTreeMap<String, Plugin>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PluginRegistry {
    /// A registry with no plugins.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in plugin.
    #[must_use]
    pub fn with_builtins() -> Self {
        let builtins: [(&str, fn(&mut FactRecord, &FactMap, &FactMap) -> Result<(), FactdexError>); 8] = [
            ("noop", noop),
            ("delete", delete),
            ("set", set),
            ("remove_from_delimited_string", remove_from_delimited_string),
            ("randomize_long_string", randomize_long_string_plugin),
            ("sshfp_randomize", sshfp_randomize),
            ("ipv4_anonymize", ipv4_anonymize),
            ("ipv6_anonymize", ipv6_anonymize),
        ];
        Self {
            plugins: builtins
                .into_iter()
                .map(|(name, f)| (name.to_string(), Box::new(f) as Plugin))
                .collect(),
        }
    }

    /// Register a plugin under a new name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        plugin: impl Fn(&mut FactRecord, &FactMap, &FactMap) -> Result<(), FactdexError> + 'static,
    ) -> Result<(), FactdexError> {
        let name = name.into();
        if self.plugins.contains_key(&name) {
            return Err(FactdexError::PluginAlreadyRegistered(name));
        }
        self.plugins.insert(name, Box::new(plugin));
        Ok(())
    }

    /// Remove a plugin. Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.plugins.remove(name).is_some()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Run the plugin `name` on `fact`.
    pub fn execute(
        &self,
        name: &str,
        fact: &mut FactRecord,
        args: &FactMap,
        node_facts: &FactMap,
    ) -> Result<(), FactdexError> {
        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| FactdexError::UnknownPlugin(name.to_string()))?;
        plugin(fact, args, node_facts)
    }
}

// =============================================================================
// RULES
// =============================================================================

/// A configured fact rule: which facts, which plugin, which arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRule {
    /// The rule's key in the configuration; names the fact by default.
    pub tag: String,
    pub selector: FactSelector,
    pub plugin: String,
    /// The rule's full table, handed to the plugin.
    pub args: FactMap,
}

impl FactRule {
    /// A rule running `plugin` on the fact named `tag`.
    #[must_use]
    pub fn new(tag: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            selector: FactSelector::default(),
            plugin: plugin.into(),
            args: FactMap::new(),
        }
    }

    /// Add an argument (builder style).
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Apply to every fact matching `pattern` instead of `tag`.
    #[must_use]
    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.selector.regexp = Some(pattern.into());
        self
    }

    /// Build a rule from a configuration table.
    ///
    /// `fact`, `regexp` and `plugin` are read from the table; the whole
    /// table is kept as the plugin's arguments.
    pub fn from_table(tag: impl Into<String>, table: &Value) -> Result<Self, FactdexError> {
        let tag = tag.into();
        let Some(args) = table.as_map() else {
            return Err(FactdexError::ConfigError(format!(
                "Fact rule {} must be a table, got {}",
                tag,
                table.type_name()
            )));
        };
        let text = |key: &str| -> Result<Option<String>, FactdexError> {
            match args.get(key) {
                None => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(FactdexError::ConfigError(format!(
                    "Fact rule {}: {} must be a string, got {}",
                    tag,
                    key,
                    other.type_name()
                ))),
            }
        };
        Ok(Self {
            selector: FactSelector {
                fact: text("fact")?,
                regexp: text("regexp")?,
            },
            plugin: text("plugin")?.unwrap_or_else(|| DEFAULT_PLUGIN.to_string()),
            args: args.clone(),
            tag,
        })
    }
}

/// Run `rules` in order over a node record.
///
/// Each rule runs its plugin once per matching fact. A fact left without a
/// value is removed from the node.
pub fn apply_rules(
    registry: &PluginRegistry,
    record: &mut FactRecord,
    rules: &[FactRule],
) -> Result<(), FactdexError> {
    for rule in rules {
        for key in record.matching_keys(&rule.tag, &rule.selector)? {
            let node_facts = record.facts().cloned().unwrap_or_default();
            let mut fact = record.take_fact(&key);
            let result = registry.execute(&rule.plugin, &mut fact, &rule.args, &node_facts);
            record.put_fact(fact);
            result?;
        }
    }
    Ok(())
}

// =============================================================================
// BUILT-IN PLUGINS
// =============================================================================

fn noop(_fact: &mut FactRecord, _args: &FactMap, _facts: &FactMap) -> Result<(), FactdexError> {
    Ok(())
}

fn delete(fact: &mut FactRecord, args: &FactMap, _facts: &FactMap) -> Result<(), FactdexError> {
    apply(fact, &Transform::delete(), args)
}

fn set(fact: &mut FactRecord, args: &FactMap, _facts: &FactMap) -> Result<(), FactdexError> {
    apply(fact, &Transform::Literal(args.get("value").cloned()), args)
}

fn remove_from_delimited_string(
    fact: &mut FactRecord,
    args: &FactMap,
    _facts: &FactMap,
) -> Result<(), FactdexError> {
    const PLUGIN: &str = "remove_from_delimited_string";
    if fact.value(None).is_none() {
        return Ok(());
    }
    let delimiter = required_str(PLUGIN, args, "delimiter")?.to_string();
    let regexp = Regex::new(required_str(PLUGIN, args, "regexp")?)
        .map_err(|e| FactdexError::InvalidPattern(e.to_string()))?;

    let transform = string_transform(PLUGIN, move |text| {
        Ok(text
            .split(delimiter.as_str())
            .filter(|part| !regexp.is_match(part))
            .collect::<Vec<_>>()
            .join(delimiter.as_str()))
    });
    apply(fact, &transform, args)
}

fn randomize_long_string_plugin(
    fact: &mut FactRecord,
    args: &FactMap,
    _facts: &FactMap,
) -> Result<(), FactdexError> {
    let transform = string_transform("randomize_long_string", |text| {
        Ok(randomize_long_string(text))
    });
    apply(fact, &transform, args)
}

fn sshfp_randomize(fact: &mut FactRecord, args: &FactMap, _facts: &FactMap) -> Result<(), FactdexError> {
    const PLUGIN: &str = "sshfp_randomize";
    let line_format = Regex::new(r"\ASSHFP (\d+) (\d+) (\w+)")
        .map_err(|e| FactdexError::InvalidPattern(e.to_string()))?;

    let transform = string_transform(PLUGIN, move |text| {
        text.split('\n')
            .map(str::trim)
            .map(|line| match line_format.captures(line) {
                Some(caps) => Ok(format!(
                    "SSHFP {} {} {}",
                    &caps[1],
                    &caps[2],
                    randomize_long_string(&caps[3])
                )),
                None => Err(invalid(PLUGIN, format!("unparseable line {:?}", line))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|lines| lines.join("\n"))
    });
    apply(fact, &transform, args)
}

fn ipv4_anonymize(fact: &mut FactRecord, args: &FactMap, _facts: &FactMap) -> Result<(), FactdexError> {
    const PLUGIN: &str = "ipv4_anonymize";
    let (network, host_mask) = parse_subnet(PLUGIN, args, 32, |addr| {
        addr.parse::<Ipv4Addr>().map(|a| u128::from(u32::from(a))).ok()
    })?;

    let transform = string_transform(PLUGIN, move |text| {
        let addr: Ipv4Addr = text
            .parse()
            .map_err(|_| invalid(PLUGIN, format!("{:?} is not an IPv4 address", text)))?;
        let mut rng = SplitMix64::new(u64::from(u32::from(addr)));
        let host = u128::from(rng.next_u64()) & host_mask;
        Ok(Ipv4Addr::from((network | host) as u32).to_string())
    });
    apply(fact, &transform, args)
}

fn ipv6_anonymize(fact: &mut FactRecord, args: &FactMap, _facts: &FactMap) -> Result<(), FactdexError> {
    const PLUGIN: &str = "ipv6_anonymize";
    let (network, host_mask) = parse_subnet(PLUGIN, args, 128, |addr| {
        addr.parse::<Ipv6Addr>().map(u128::from).ok()
    })?;

    let transform = string_transform(PLUGIN, move |text| {
        let addr = u128::from(
            text.parse::<Ipv6Addr>()
                .map_err(|_| invalid(PLUGIN, format!("{:?} is not an IPv6 address", text)))?,
        );
        let mut rng = SplitMix64::new((addr >> 64) as u64 ^ addr as u64);
        let random = (u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64());
        Ok(Ipv6Addr::from(network | (random & host_mask)).to_string())
    });
    apply(fact, &transform, args)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Replace every character with a pseudo-random alphanumeric one.
///
/// The output has as many characters as the input and depends only on it.
#[must_use]
pub fn randomize_long_string(input: &str) -> String {
    let mut rng = SplitMix64::new(fnv1a(input.as_bytes()));
    input
        .chars()
        .map(|_| {
            let pick = (rng.next_u64() % ALPHANUMERIC.len() as u64) as usize;
            char::from(ALPHANUMERIC[pick])
        })
        .collect()
}

struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}

fn invalid(plugin: &str, reason: impl Into<String>) -> FactdexError {
    FactdexError::InvalidPluginArgs {
        plugin: plugin.to_string(),
        reason: reason.into(),
    }
}

fn required_str<'a>(plugin: &str, args: &'a FactMap, key: &str) -> Result<&'a str, FactdexError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(plugin, format!("{} is required", key)))
}

/// Apply a transform to the fact, or at its `structure` argument.
fn apply(fact: &mut FactRecord, transform: &Transform, args: &FactMap) -> Result<(), FactdexError> {
    let path = args.get("structure").map(Path::from_value).transpose()?;
    fact.set_value(transform, path.as_ref()).map(|_| ())
}

/// A transform rewriting string values. Absent values stay absent.
fn string_transform(
    plugin: &'static str,
    f: impl Fn(&str) -> Result<String, FactdexError> + 'static,
) -> Transform {
    Transform::unary(move |old| match old {
        None => Ok(None),
        Some(Value::String(text)) => f(text).map(|s| Some(Value::String(s))),
        Some(other) => Err(invalid(
            plugin,
            format!("expected a string value, got {}", other.type_name()),
        )),
    })
}

/// Parse the `subnet` argument (`addr/prefix`) into the network bits and the
/// host mask. A subnet without a prefix is a single address.
fn parse_subnet(
    plugin: &str,
    args: &FactMap,
    bits: u32,
    parse_addr: impl Fn(&str) -> Option<u128>,
) -> Result<(u128, u128), FactdexError> {
    let subnet = required_str(plugin, args, "subnet")?;
    let (addr, prefix) = match subnet.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.parse::<u32>().ok()),
        None => (subnet, Some(bits)),
    };
    let (Some(addr), Some(prefix)) = (parse_addr(addr), prefix.filter(|p| *p <= bits)) else {
        return Err(invalid(plugin, format!("invalid subnet {:?}", subnet)));
    };

    let host_bits = bits - prefix;
    let host_mask = if host_bits == 0 {
        0
    } else {
        u128::MAX >> (128 - host_bits)
    };
    Ok((addr & !host_mask, host_mask))
}

// =============================================================================
// TESTS
// =============================================================================
