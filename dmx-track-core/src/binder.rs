//! Channel binding
//!
//! Maps channel indices to opaque host handles through an injected
//! [`ChannelResolver`]. The core never inspects the host scene; whoever
//! supplies the resolver decides what a channel binds to.

use crate::config::ScaleConfig;
use crate::types::{PipelineError, Result};
use std::collections::{BTreeMap, HashMap};

/// Resolves a channel index to a host handle
///
/// Returning `None` marks the channel unresolved; this is a normal outcome.
pub trait ChannelResolver {
    type Handle;

    fn resolve(&mut self, channel_index: usize) -> Option<Self::Handle>;
}

/// Closures work as ad-hoc resolvers
impl<H, F> ChannelResolver for F
where
    F: FnMut(usize) -> Option<H>,
{
    type Handle = H;

    fn resolve(&mut self, channel_index: usize) -> Option<H> {
        self(channel_index)
    }
}

/// Association of one channel with a host handle
#[derive(Debug, Clone, PartialEq)]
pub struct Binding<H> {
    pub channel_index: usize,
    pub handle: H,
    pub scale_multiplier: f64,
}

/// Result of binding a table's channels
#[derive(Debug, Clone)]
pub struct ChannelBindings<H> {
    /// Resolved channels, ordered by channel index
    pub bound: BTreeMap<usize, Binding<H>>,
    /// Channels the resolver could not place, in ascending order
    pub unresolved: Vec<usize>,
}

impl<H> ChannelBindings<H> {
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Bindings in ascending channel order
    pub fn iter(&self) -> impl Iterator<Item = &Binding<H>> {
        self.bound.values()
    }
}

/// Bind every channel named in `channel_names`
///
/// Fails with [`PipelineError::NoBindings`] only when no channel resolves.
pub fn bind<R>(
    channel_names: &[String],
    resolver: &mut R,
    scale: &ScaleConfig,
) -> Result<ChannelBindings<R::Handle>>
where
    R: ChannelResolver,
{
    let mut bound = BTreeMap::new();
    let mut unresolved = Vec::new();

    for (channel_index, name) in channel_names.iter().enumerate() {
        match resolver.resolve(channel_index) {
            Some(handle) => {
                log::trace!("Bound channel {} ({})", channel_index, name);
                bound.insert(
                    channel_index,
                    Binding {
                        channel_index,
                        handle,
                        scale_multiplier: scale.multiplier_for(channel_index),
                    },
                );
            }
            None => {
                log::warn!("Channel {} ({}) is unresolved, skipping", channel_index, name);
                unresolved.push(channel_index);
            }
        }
    }

    if bound.is_empty() {
        return Err(PipelineError::NoBindings {
            channels: channel_names.len(),
        });
    }

    log::info!(
        "Bound {} of {} channels ({} unresolved)",
        bound.len(),
        channel_names.len(),
        unresolved.len()
    );

    Ok(ChannelBindings { bound, unresolved })
}

/// Placeholder replaced by the channel index in a label pattern
pub const INDEX_PLACEHOLDER: &str = "{i}";

/// Default label pattern for scene objects driven by channel `i`
pub const DEFAULT_LABEL_PATTERN: &str = "PointLight{i}";

/// Substitute a channel index into a label pattern
pub fn label_for_pattern(pattern: &str, channel_index: usize) -> String {
    pattern.replace(INDEX_PLACEHOLDER, &channel_index.to_string())
}

/// Resolves channels by formatting a label and looking it up in a name map
///
/// The map comes from the host side (for example, the labels of lights found
/// in a scene). With the default pattern, channel 3 resolves to whatever
/// the map stores under `PointLight3`.
#[derive(Debug, Clone)]
pub struct NameMapResolver<H> {
    pattern: String,
    handles: HashMap<String, H>,
}

impl<H: Clone> NameMapResolver<H> {
    pub fn new(handles: HashMap<String, H>) -> Self {
        Self {
            pattern: DEFAULT_LABEL_PATTERN.to_string(),
            handles,
        }
    }

    /// Builder method: set the label pattern (must contain `{i}`)
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Label the pattern produces for a channel
    pub fn label_for(&self, channel_index: usize) -> String {
        label_for_pattern(&self.pattern, channel_index)
    }
}

impl<H: Clone> ChannelResolver for NameMapResolver<H> {
    type Handle = H;

    fn resolve(&mut self, channel_index: usize) -> Option<H> {
        self.handles.get(&self.label_for(channel_index)).cloned()
    }
}
