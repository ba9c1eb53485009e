//! Redis-like keyed command client
//!
//! Plugins talk to the shared key-value/cache store through
//! [`CommandClient::send_command`], mirroring the redis wire vocabulary.
//! [`MemoryCommandStore`] implements the subset the platform relies on.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Reply to a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    Nil,
    Ok,
    Integer(i64),
    Bulk(String),
    Array(Vec<CommandReply>),
}

impl CommandReply {
    /// Bulk string payload, if any
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Bulk(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// Command interface to the key-value store
#[async_trait]
pub trait CommandClient: Send + Sync {
    /// Execute `command` with `args`
    async fn send_command(&self, command: &str, args: &[String]) -> Result<CommandReply>;
}

#[derive(Debug, Clone)]
enum Stored {
    String(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process key-value store
#[derive(Debug, Default)]
pub struct MemoryCommandStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCommandStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn arity(command: &str, args: &[String], min: usize) -> Result<()> {
    if args.len() < min {
        return Err(Error::Command(format!(
            "wrong number of arguments for '{command}'"
        )));
    }
    Ok(())
}

fn parse_int(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|_| Error::Command("value is not an integer or out of range".to_string()))
}

fn invalid_expire() -> Error {
    Error::Command("invalid expire time".to_string())
}

fn deadline(now: Instant, secs: u64) -> Result<Instant> {
    now.checked_add(Duration::from_secs(secs))
        .ok_or_else(invalid_expire)
}

fn wrong_type() -> Error {
    Error::Command("operation against a key holding the wrong kind of value".to_string())
}

/// Minimal glob: `*` anywhere, everything else literal
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            let Some(stripped) = rest.strip_prefix(part) else {
                return false;
            };
            rest = stripped;
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(pos) = rest.find(part) {
            rest = &rest[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}

#[async_trait]
impl CommandClient for MemoryCommandStore {
    #[allow(clippy::too_many_lines)]
    async fn send_command(&self, command: &str, args: &[String]) -> Result<CommandReply> {
        let cmd = command.to_ascii_uppercase();
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.is_expired(now));

        match cmd.as_str() {
            "GET" => {
                arity(&cmd, args, 1)?;
                match entries.get(&args[0]) {
                    None => Ok(CommandReply::Nil),
                    Some(Entry {
                        value: Stored::String(s),
                        ..
                    }) => Ok(CommandReply::Bulk(s.clone())),
                    Some(_) => Err(wrong_type()),
                }
            }
            "SET" => {
                arity(&cmd, args, 2)?;
                let expires_at = match args.get(2).map(|s| s.to_ascii_uppercase()).as_deref() {
                    None => None,
                    Some("EX") => {
                        let secs = args
                            .get(3)
                            .ok_or_else(|| Error::Command("syntax error".to_string()))?;
                        let secs = u64::try_from(parse_int(secs)?)
                            .map_err(|_| invalid_expire())?;
                        Some(deadline(now, secs)?)
                    }
                    Some(_) => return Err(Error::Command("syntax error".to_string())),
                };
                entries.insert(
                    args[0].clone(),
                    Entry {
                        value: Stored::String(args[1].clone()),
                        expires_at,
                    },
                );
                Ok(CommandReply::Ok)
            }
            "DEL" => {
                arity(&cmd, args, 1)?;
                let removed = args.iter().filter(|k| entries.remove(*k).is_some()).count();
                Ok(CommandReply::Integer(i64::try_from(removed).unwrap_or(i64::MAX)))
            }
            "EXISTS" => {
                arity(&cmd, args, 1)?;
                let found = args.iter().filter(|k| entries.contains_key(*k)).count();
                Ok(CommandReply::Integer(i64::try_from(found).unwrap_or(i64::MAX)))
            }
            "INCR" => {
                arity(&cmd, args, 1)?;
                let entry = entries.entry(args[0].clone()).or_insert_with(|| Entry {
                    value: Stored::String("0".to_string()),
                    expires_at: None,
                });
                let Stored::String(current) = &mut entry.value else {
                    return Err(wrong_type());
                };
                let next = parse_int(current)?
                    .checked_add(1)
                    .ok_or_else(|| Error::Command("increment would overflow".to_string()))?;
                *current = next.to_string();
                Ok(CommandReply::Integer(next))
            }
            "EXPIRE" => {
                arity(&cmd, args, 2)?;
                // Negative timeouts expire the key at once
                let secs = u64::try_from(parse_int(&args[1])?).unwrap_or(0);
                let expires_at = deadline(now, secs)?;
                match entries.get_mut(&args[0]) {
                    Some(entry) => {
                        entry.expires_at = Some(expires_at);
                        Ok(CommandReply::Integer(1))
                    }
                    None => Ok(CommandReply::Integer(0)),
                }
            }
            "TTL" => {
                arity(&cmd, args, 1)?;
                let ttl = match entries.get(&args[0]) {
                    None => -2,
                    Some(Entry {
                        expires_at: None, ..
                    }) => -1,
                    Some(Entry {
                        expires_at: Some(at),
                        ..
                    }) => i64::try_from(at.saturating_duration_since(now).as_secs())
                        .unwrap_or(i64::MAX),
                };
                Ok(CommandReply::Integer(ttl))
            }
            "HSET" => {
                arity(&cmd, args, 3)?;
                if args.len() % 2 == 0 {
                    return Err(Error::Command(
                        "wrong number of arguments for 'HSET'".to_string(),
                    ));
                }
                let entry = entries.entry(args[0].clone()).or_insert_with(|| Entry {
                    value: Stored::Hash(HashMap::new()),
                    expires_at: None,
                });
                let Stored::Hash(hash) = &mut entry.value else {
                    return Err(wrong_type());
                };
                let added = args[1..]
                    .chunks(2)
                    .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                    .count();
                Ok(CommandReply::Integer(i64::try_from(added).unwrap_or(i64::MAX)))
            }
            "HGET" => {
                arity(&cmd, args, 2)?;
                match entries.get(&args[0]) {
                    None => Ok(CommandReply::Nil),
                    Some(Entry {
                        value: Stored::Hash(hash),
                        ..
                    }) => Ok(hash
                        .get(&args[1])
                        .map_or(CommandReply::Nil, |v| CommandReply::Bulk(v.clone()))),
                    Some(_) => Err(wrong_type()),
                }
            }
            "HDEL" => {
                arity(&cmd, args, 2)?;
                let removed = match entries.get_mut(&args[0]) {
                    None => 0,
                    Some(Entry {
                        value: Stored::Hash(hash),
                        ..
                    }) => args[1..].iter().filter(|f| hash.remove(*f).is_some()).count(),
                    Some(_) => return Err(wrong_type()),
                };
                Ok(CommandReply::Integer(i64::try_from(removed).unwrap_or(i64::MAX)))
            }
            "HGETALL" => {
                arity(&cmd, args, 1)?;
                match entries.get(&args[0]) {
                    None => Ok(CommandReply::Array(Vec::new())),
                    Some(Entry {
                        value: Stored::Hash(hash),
                        ..
                    }) => {
                        let mut fields: Vec<(&String, &String)> = hash.iter().collect();
                        fields.sort();
                        Ok(CommandReply::Array(
                            fields
                                .into_iter()
                                .flat_map(|(k, v)| {
                                    [CommandReply::Bulk(k.clone()), CommandReply::Bulk(v.clone())]
                                })
                                .collect(),
                        ))
                    }
                    Some(_) => Err(wrong_type()),
                }
            }
            "KEYS" => {
                arity(&cmd, args, 1)?;
                let mut keys: Vec<&String> = entries
                    .keys()
                    .filter(|k| glob_match(&args[0], k))
                    .collect();
                keys.sort();
                Ok(CommandReply::Array(
                    keys.into_iter()
                        .map(|k| CommandReply::Bulk(k.clone()))
                        .collect(),
                ))
            }
            _ => Err(Error::Command(format!("unknown command '{command}'"))),
        }
    }
}
