//! Shared runtime services handed to every module
//!
//! Cloning is cheap; every field is a handle.

use crate::channel::ChannelRegistry;
use crate::rpc::RemoteFunctionHandler;
use crate::scheduler::Scheduler;
use codec::CodecRegistry;
use network::OutboundQueue;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RuntimeServices {
    pub(crate) runtime_name: Arc<str>,
    pub(crate) codecs: Arc<CodecRegistry>,
    pub(crate) channels: Arc<ChannelRegistry>,
    pub(crate) remote_functions: Arc<RemoteFunctionHandler>,
    pub(crate) outbound: OutboundQueue,
    pub(crate) scheduler: Scheduler,
}

impl RuntimeServices {
    pub fn new(
        runtime_name: &str,
        codecs: Arc<CodecRegistry>,
        outbound: OutboundQueue,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            runtime_name: Arc::from(runtime_name),
            channels: Arc::new(ChannelRegistry::new(codecs.clone())),
            remote_functions: Arc::new(RemoteFunctionHandler::new(
                runtime_name,
                outbound.clone(),
                codecs.clone(),
            )),
            codecs,
            outbound,
            scheduler,
        }
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn remote_functions(&self) -> &Arc<RemoteFunctionHandler> {
        &self.remote_functions
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
