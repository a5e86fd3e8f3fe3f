//! The stack context and its cooperative scheduler.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use log::{error, info, warn};
use lon_core::config::{ConfigData, ReadOnlyData};
use lon_core::stats::NodeStats;
use lon_core::time::{Clock, Sleeper};
use lon_network::link::{LinkLayer, LonLink};
use lon_network::net::NetworkLayer;
use lon_network::records::{Channels, CompletionEvent, Delivery, NwSendRequest};
use lon_persistent::{FlashDevice, PersistenceError, SegmentManager, SegmentType};

use crate::codecs::{AppDataCodec, NetworkImageCodec};

/// Init-time stack parameters.
#[derive(Debug, Clone, Copy)]
pub struct StackConfig {
    pub read_only: ReadOnlyData,
    /// Application identity stamped into persisted segments. Zero is the
    /// validation wildcard.
    pub app_signature: u32,
    /// Quiescent interval before dirty segments are committed.
    pub guard_band_ms: u64,
}

/// The assembled protocol stack core.
///
/// Every layer entry point receives this context explicitly; there is no
/// global state. The embedding owns the instance and pumps it with
/// [`Stack::run_once`].
pub struct Stack<F: FlashDevice> {
    ro: ReadOnlyData,
    config: Rc<RefCell<ConfigData>>,
    stats: NodeStats,
    channels: Option<Channels>,
    link: LinkLayer,
    net: NetworkLayer,
    persist: SegmentManager<F>,
    reset_ok: bool,
}

impl<F: FlashDevice> Stack<F> {
    /// Build the context. Layers come up on [`Stack::reset`].
    pub fn new(config: StackConfig, flash: F) -> Result<Self, PersistenceError> {
        let shared = Rc::new(RefCell::new(ConfigData::unconfigured()));
        let mut persist = SegmentManager::new(flash, config.app_signature, config.guard_band_ms)?;
        persist.register_codec(
            SegmentType::NetworkImage,
            Box::new(NetworkImageCodec::new(shared.clone())),
        );
        Ok(Self {
            ro: config.read_only,
            config: shared,
            stats: NodeStats::new(),
            channels: None,
            link: LinkLayer::new(),
            net: NetworkLayer::new(),
            persist,
            reset_ok: false,
        })
    }

    /// Bring the stack up: link reset (with the power-line unique-id
    /// probe), network reset, then network-image restore.
    ///
    /// Any failure leaves `reset_ok` false; a stack in that state pumps
    /// nothing and refuses configuration.
    pub fn reset(
        &mut self,
        links: Vec<Box<dyn LonLink>>,
        clock: &dyn Clock,
        sleeper: &dyn Sleeper,
    ) {
        self.reset_ok = false;

        self.channels = match Channels::allocate(&self.ro) {
            Ok(channels) => Some(channels),
            Err(e) => {
                error!("stack: queue allocation failed: {}", e);
                return;
            }
        };

        self.link.reset(&self.ro, links, clock, sleeper);
        if !self.link.is_reset_ok() {
            return;
        }
        // A power-line transceiver knows the node's unique id better
        // than the compiled-in read-only image does.
        if let Some(id) = self.link.unique_id() {
            self.ro.unique_node_id = id;
        }

        self.net.reset(&self.ro);
        if !self.net.is_reset_ok() {
            return;
        }

        match self.persist.restore(SegmentType::NetworkImage) {
            Ok(()) => info!("stack: network image restored"),
            Err(_) => {
                info!("stack: no valid network image, starting unconfigured");
                *self.config.borrow_mut() = ConfigData::unconfigured();
            }
        }

        self.reset_ok = true;
    }

    /// One scheduler round: pump each layer once, then the commit check.
    pub fn run_once(&mut self, clock: &dyn Clock, sleeper: &dyn Sleeper) {
        if !self.reset_ok {
            return;
        }
        let channels = match self.channels.as_mut() {
            Some(channels) => channels,
            None => return,
        };
        let cfg = *self.config.borrow();

        self.link.receive(channels, &mut self.stats);
        self.net.receive(channels, &cfg, &self.ro, &mut self.stats);
        self.net.send(channels, &cfg, &self.ro, &mut self.stats);
        self.link.send(channels, &mut self.stats, clock);
        self.persist.commit_tick(clock, sleeper);
    }

    /// Flush pending persistence and close the interfaces.
    pub fn shutdown(&mut self, clock: &dyn Clock, sleeper: &dyn Sleeper) {
        self.persist.request_flush();
        self.persist.commit_tick(clock, sleeper);
        self.link.shutdown();
        self.reset_ok = false;
    }

    // ─── Application surface ────────────────────────────────────────────

    /// Queue an outbound PDU. Returns false when the outbound queue is
    /// full (retry after a pump) or the stack is down.
    pub fn submit(&mut self, req: &NwSendRequest, pdu: &[u8], priority: bool) -> bool {
        if !self.reset_ok {
            return false;
        }
        match self.channels.as_mut() {
            Some(channels) => channels.submit(req, pdu, priority),
            None => false,
        }
    }

    /// Next PDU delivered to the application, if any.
    pub fn next_app_delivery(&mut self) -> Option<(Delivery, Vec<u8>)> {
        self.channels.as_mut()?.next_app_delivery()
    }

    /// Next PDU delivered to the transport/session layers, if any.
    pub fn next_tsa_delivery(&mut self) -> Option<(Delivery, Vec<u8>)> {
        self.channels.as_mut()?.next_tsa_delivery()
    }

    /// Next send-completion event, if any.
    pub fn next_completion(&mut self) -> Option<CompletionEvent> {
        self.channels.as_mut()?.next_completion()
    }

    /// Adopt a new network image and schedule it for persistence.
    ///
    /// Refused while the stack is down: a node whose reset failed must
    /// not enter the configured state.
    pub fn apply_config(&mut self, config: ConfigData, clock: &dyn Clock) -> bool {
        if !self.reset_ok {
            warn!("stack: configuration refused, reset incomplete");
            return false;
        }
        *self.config.borrow_mut() = config;
        self.mark_config_dirty(clock);
        true
    }

    /// Mark the network image dirty and (re)arm the commit guard band.
    pub fn mark_config_dirty(&mut self, clock: &dyn Clock) {
        self.persist.set_commit_flag(SegmentType::NetworkImage);
        self.persist.start_commit_timer(clock);
    }

    /// Register the application-data segment handlers.
    pub fn register_app_data(
        &mut self,
        serialize: Box<dyn Fn(&mut Vec<u8>)>,
        deserialize: Box<dyn FnMut(&[u8]) -> Result<(), PersistenceError>>,
    ) {
        self.persist.register_codec(
            SegmentType::ApplicationData,
            Box::new(AppDataCodec::new(serialize, deserialize)),
        );
    }

    /// Restore the application-data segment through its handlers.
    pub fn restore_app_data(&mut self) -> Result<(), PersistenceError> {
        self.persist.restore(SegmentType::ApplicationData)
    }

    /// Mark the application-data segment dirty.
    pub fn mark_app_data_dirty(&mut self, clock: &dyn Clock) {
        self.persist.set_commit_flag(SegmentType::ApplicationData);
        self.persist.start_commit_timer(clock);
    }

    // ─── Introspection ──────────────────────────────────────────────────

    #[inline]
    pub fn is_reset_ok(&self) -> bool {
        self.reset_ok
    }

    /// Current network image.
    pub fn config(&self) -> ConfigData {
        *self.config.borrow()
    }

    /// Read-only data, including any unique id adopted from the
    /// transceiver.
    pub fn read_only(&self) -> &ReadOnlyData {
        &self.ro
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    /// The persistence manager, for segment registration beyond the
    /// built-ins.
    pub fn persistence(&mut self) -> &mut SegmentManager<F> {
        &mut self.persist
    }

    /// Tear down and recover the flash device.
    pub fn into_flash(self) -> F {
        self.persist.into_flash()
    }
}
