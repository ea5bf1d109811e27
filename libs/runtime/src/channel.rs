//! Channel Registry
//!
//! Tracks, per `(channel, module)` pair, the payload type the pair was
//! declared with, whether the module publishes on it and who subscribes.
//! Inbound data packages are dispatched here after their payload tag has been
//! checked against the declared type; mismatches are never delivered.

use crate::error::{Result, RoutingError, RuntimeError};
use codec::{CodecRegistry, WireType};
use dashmap::DashMap;
use network::OutboundQueue;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace};
use types::{current_timestamp_ms, Package, Payload, TypeTag};

/// Receives every package delivered to one subscription
pub type Subscriber = Arc<dyn Fn(&Package) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAccess {
    Publish,
    Subscribe,
}

struct ChannelRecord {
    type_tag: TypeTag,
    published: bool,
    subscribers: Vec<Subscriber>,
    examples: Vec<Package>,
}

impl ChannelRecord {
    fn new(type_tag: TypeTag) -> Self {
        Self {
            type_tag,
            published: false,
            subscribers: Vec::new(),
            examples: Vec::new(),
        }
    }
}

/// channel -> module -> record
pub struct ChannelRegistry {
    codecs: Arc<CodecRegistry>,
    records: DashMap<String, HashMap<String, ChannelRecord>>,
}

impl ChannelRegistry {
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            codecs,
            records: DashMap::new(),
        }
    }

    /// Declare that `module_id` publishes `channel` with `example`'s type
    pub fn publish<T: WireType>(&self, module_id: &str, channel: &str, example: &T) -> Result<()> {
        let payload = self.codecs.encode(example)?;
        self.register(module_id, channel, payload, ChannelAccess::Publish, None)
    }

    /// Declare that `module_id` subscribes to `channel` with `example`'s type
    pub fn subscribe<T: WireType>(
        &self,
        module_id: &str,
        channel: &str,
        example: &T,
        subscriber: Subscriber,
    ) -> Result<()> {
        let payload = self.codecs.encode(example)?;
        self.register(module_id, channel, payload, ChannelAccess::Subscribe, Some(subscriber))
    }

    fn register(
        &self,
        module_id: &str,
        channel: &str,
        example: Payload,
        access: ChannelAccess,
        subscriber: Option<Subscriber>,
    ) -> Result<()> {
        let mut modules = self.records.entry(channel.to_string()).or_default();
        let record = modules
            .entry(module_id.to_string())
            .or_insert_with(|| ChannelRecord::new(example.type_tag.clone()));

        if record.type_tag != example.type_tag {
            return Err(RuntimeError::ChannelTypeConflict {
                module_id: module_id.to_string(),
                channel: channel.to_string(),
                declared: record.type_tag.clone(),
                requested: example.type_tag,
            });
        }

        let package = Package::with_payload(example).on_channel(channel);
        match access {
            ChannelAccess::Publish => {
                if !record.published {
                    record.published = true;
                    record.examples.push(package.from_module(module_id));
                }
            }
            ChannelAccess::Subscribe => {
                if record.subscribers.is_empty() {
                    record.examples.push(package.to_module(module_id));
                }
                record.subscribers.extend(subscriber);
            }
        }

        debug!(module_id, channel, type_tag = %record.type_tag, ?access, "Registered channel");
        Ok(())
    }

    /// Deliver `package` to every subscriber of its `(channel, target module)`
    /// pair, in registration order. Returns the number of subscribers.
    pub fn dispatch(&self, package: &Package) -> std::result::Result<usize, RoutingError> {
        let payload = package.payload().ok_or_else(|| RoutingError::MissingPayload {
            package_id: package.id.clone(),
        })?;

        let subscribers = {
            let unknown = || RoutingError::UnknownChannel {
                channel: package.channel.clone(),
                module_id: package.target_module.clone(),
            };
            let modules = self.records.get(&package.channel).ok_or_else(unknown)?;
            let record = modules.get(&package.target_module).ok_or_else(unknown)?;

            if record.type_tag != payload.type_tag {
                return Err(RoutingError::TypeMismatch {
                    channel: package.channel.clone(),
                    module_id: package.target_module.clone(),
                    expected: record.type_tag.clone(),
                    actual: payload.type_tag.clone(),
                });
            }
            if record.subscribers.is_empty() {
                return Err(RoutingError::NotSubscribed {
                    channel: package.channel.clone(),
                    module_id: package.target_module.clone(),
                });
            }
            record.subscribers.clone()
        };

        trace!(channel = %package.channel, module_id = %package.target_module, subscribers = subscribers.len(), "Dispatching data package");
        for subscriber in &subscribers {
            subscriber(package);
        }
        Ok(subscribers.len())
    }

    /// Example packages for the init-runtime request, sorted by channel
    pub fn example_packages(&self, module_id: &str) -> Vec<Package> {
        let mut channels: Vec<(String, Vec<Package>)> = self
            .records
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .get(module_id)
                    .map(|record| (entry.key().clone(), record.examples.clone()))
            })
            .collect();
        channels.sort_by(|a, b| a.0.cmp(&b.0));
        channels.into_iter().flat_map(|(_, examples)| examples).collect()
    }

    pub fn declared_type(&self, module_id: &str, channel: &str) -> Option<TypeTag> {
        self.records
            .get(channel)
            .and_then(|modules| modules.get(module_id).map(|record| record.type_tag.clone()))
    }

    pub fn subscriber_count(&self, module_id: &str, channel: &str) -> usize {
        self.records
            .get(channel)
            .and_then(|modules| modules.get(module_id).map(|record| record.subscribers.len()))
            .unwrap_or(0)
    }

    pub fn remove_module(&self, module_id: &str) {
        self.records.retain(|_, modules| {
            modules.remove(module_id);
            !modules.is_empty()
        });
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.records.len())
            .finish()
    }
}

/// Typed handle returned by publish and subscribe
pub struct Channel<T> {
    name: String,
    module_id: String,
    access: ChannelAccess,
    outbound: OutboundQueue,
    _marker: PhantomData<fn(T)>,
}

impl<T: WireType> Channel<T> {
    pub(crate) fn new(name: &str, module_id: &str, access: ChannelAccess, outbound: OutboundQueue) -> Self {
        Self {
            name: name.to_string(),
            module_id: module_id.to_string(),
            access,
            outbound,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> ChannelAccess {
        self.access
    }

    pub fn can_post(&self) -> bool {
        self.access == ChannelAccess::Publish
    }

    pub fn post(&self, value: &T) -> Result<()> {
        self.post_with_timestamp(value, current_timestamp_ms())
    }

    pub fn post_with_timestamp(&self, value: &T, unix_timestamp_ms: u64) -> Result<()> {
        if !self.can_post() {
            return Err(RuntimeError::ReadOnlyChannel {
                module_id: self.module_id.clone(),
                channel: self.name.clone(),
            });
        }
        let package = Package::with_payload(value.encode()?)
            .on_channel(&self.name)
            .from_module(&self.module_id)
            .stamped_at(unix_timestamp_ms);
        self.outbound.enqueue(package)?;
        Ok(())
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            module_id: self.module_id.clone(),
            access: self.access,
            outbound: self.outbound.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("module_id", &self.module_id)
            .field("access", &self.access)
            .finish()
    }
}
