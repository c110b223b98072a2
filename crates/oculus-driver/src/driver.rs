//! Ping configuration policy layered on top of the sans-IO [`Client`]:
//! tracking the firmware's broken `ping_rate` echo, rescaling `master_mode
//! == 2` gain reports, and fanning incoming messages out to subscribers.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use oculus_core::{CallbackRegistry, OculusError, Result};
use oculus_proto::{
    config::{self, PingConfig, PING_RATE_STANDBY},
    ids,
    ping::{rescale_reported_gain, PingView},
    Message, StatusMsg,
};
use zerocopy::IntoBytes;

use crate::{
    client::Client,
    event::{ClientAction, ClientEvent},
};

/// Attempts `request_ping_config` makes before giving up and reporting
/// [`OculusError::ConfigUnverified`].
const MAX_CONFIG_REQUEST_ATTEMPTS: u32 = 100;

/// Wraps a [`Client`] with the policy a caller actually wants: a
/// `send_ping_config`/`current_ping_config` pair that does the right thing
/// around firmware quirks, and five independent callback registries
/// (message, status, ping, dummy, config-change) instead of one firehose.
pub struct Driver {
    client: Mutex<Client>,
    dst_id: u16,
    last_requested: Mutex<PingConfig>,
    /// Last non-standby ping rate requested, tracked client-side because
    /// the firmware never echoes `ping_rate` back in a ping result.
    last_ping_rate: Mutex<u8>,
    message_callbacks: Arc<CallbackRegistry<Message>>,
    status_callbacks: Arc<CallbackRegistry<StatusMsg>>,
    ping_callbacks: Arc<CallbackRegistry<PingView>>,
    dummy_callbacks: Arc<CallbackRegistry<Message>>,
    config_change_callbacks: Arc<CallbackRegistry<PingConfig>>,
}

impl Driver {
    /// Builds a driver for the sonar addressed as `dst_id`, with the
    /// default ping configuration as its initial "last requested" state.
    #[must_use]
    pub fn new(dst_id: u16) -> Self {
        let default_config = config::default_ping_config();
        Self {
            client: Mutex::new(Client::new()),
            dst_id,
            last_requested: Mutex::new(default_config),
            last_ping_rate: Mutex::new(default_config.ping_rate()),
            message_callbacks: Arc::new(CallbackRegistry::new()),
            status_callbacks: Arc::new(CallbackRegistry::new()),
            ping_callbacks: Arc::new(CallbackRegistry::new()),
            dummy_callbacks: Arc::new(CallbackRegistry::new()),
            config_change_callbacks: Arc::new(CallbackRegistry::new()),
        }
    }

    /// Subscribers to every framed message, regardless of type.
    #[must_use]
    pub fn message_callbacks(&self) -> &Arc<CallbackRegistry<Message>> {
        &self.message_callbacks
    }

    /// Subscribers to UDP status broadcasts.
    #[must_use]
    pub fn status_callbacks(&self) -> &Arc<CallbackRegistry<StatusMsg>> {
        &self.status_callbacks
    }

    /// Subscribers to parsed ping results.
    #[must_use]
    pub fn ping_callbacks(&self) -> &Arc<CallbackRegistry<PingView>> {
        &self.ping_callbacks
    }

    /// Subscribers to standby-acknowledgment (`DUMMY`) messages.
    #[must_use]
    pub fn dummy_callbacks(&self) -> &Arc<CallbackRegistry<Message>> {
        &self.dummy_callbacks
    }

    /// Subscribers notified whenever the effective configuration changes.
    #[must_use]
    pub fn config_change_callbacks(&self) -> &Arc<CallbackRegistry<PingConfig>> {
        &self.config_change_callbacks
    }

    /// Feeds one event through the connection state machine, runs the
    /// policy above on any messages it framed, and returns the
    /// transport-facing actions the I/O driver still needs to carry out
    /// (connects, sends, closes); framed messages are not returned since
    /// they have already been fanned out to subscribers.
    pub fn handle(&self, event: ClientEvent) -> Vec<ClientAction> {
        if let ClientEvent::StatusObserved(status) = &event {
            self.status_callbacks.call(status);
        }
        let actions = self.client.lock().unwrap_or_else(std::sync::PoisonError::into_inner).handle(event);
        actions
            .into_iter()
            .filter_map(|action| match action {
                ClientAction::Deliver(message) => {
                    self.handle_message(&message);
                    None
                }
                other => Some(other),
            })
            .collect()
    }

    /// The driver's view of which sonar this is.
    #[must_use]
    pub fn dst_id(&self) -> u16 {
        self.dst_id
    }

    fn handle_message(&self, message: &Message) {
        self.message_callbacks.call(message);

        if message.message_id() == ids::DUMMY {
            self.on_standby_acknowledged(message);
            return;
        }

        if !message.is_ping_message() {
            return;
        }

        let Some(view) = PingView::parse(message.header(), message.data()) else {
            return;
        };

        let mut feedback = view.fire_message();
        feedback.set_ping_rate(*self.last_ping_rate.lock().unwrap_or_else(std::sync::PoisonError::into_inner));
        if view.needs_gain_rescale() {
            feedback.set_gain_percent(rescale_reported_gain(feedback.gain_percent()));
        }

        let changed = {
            let mut last = self.last_requested.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let changed = config::config_changed(&last, &feedback);
            if changed {
                *last = feedback;
            }
            changed
        };
        if changed {
            self.config_change_callbacks.call(&feedback);
        }

        self.ping_callbacks.call(&view);
    }

    fn on_standby_acknowledged(&self, message: &Message) {
        let mut last = self.last_requested.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if last.ping_rate() != PING_RATE_STANDBY {
            last.set_ping_rate(PING_RATE_STANDBY);
            let snapshot = *last;
            drop(last);
            self.config_change_callbacks.call(&snapshot);
        }
        self.dummy_callbacks.call(message);
    }

    /// Stamps `config` for sending to `dst_id`, records it as the last
    /// requested configuration, and returns the bytes to write to the
    /// socket.
    pub fn send_ping_config(&self, mut config: PingConfig) -> ClientAction {
        config.stamp_for_send(self.dst_id);
        if config.ping_rate() != PING_RATE_STANDBY {
            *self.last_ping_rate.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = config.ping_rate();
        }
        *self.last_requested.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = config;
        ClientAction::Send(bytes::Bytes::copy_from_slice(config.as_bytes()))
    }

    /// Stops pinging without dropping the connection.
    pub fn standby(&self) -> ClientAction {
        let mut config = *self.last_requested.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        config.set_ping_rate(PING_RATE_STANDBY);
        self.send_ping_config(config)
    }

    /// Resumes pinging at the last non-standby rate requested.
    pub fn resume(&self) -> ClientAction {
        let mut config = *self.last_requested.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        config.set_ping_rate(*self.last_ping_rate.lock().unwrap_or_else(std::sync::PoisonError::into_inner));
        self.send_ping_config(config)
    }

    /// Re-sends the last requested configuration; called by the transport
    /// on every successful (re)connect so the sonar resumes exactly where
    /// the caller last left it.
    pub fn on_connect(&self) -> ClientAction {
        let config = *self.last_requested.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.send_ping_config(config)
    }

    /// Blocks until the next framed message arrives, then returns the last
    /// requested configuration stamped with that message's header. Waits on
    /// the message registry rather than the config-change registry: in
    /// steady-state pinging the configuration isn't changing at all, and
    /// this must still return promptly.
    pub fn current_ping_config(self: &Arc<Self>, timeout: Duration) -> Result<PingConfig> {
        let message = self.message_callbacks.wait_once_cloned(timeout).map_err(|_| OculusError::TimeoutReached {
            waited_for: "ping configuration acknowledgment",
        })?;
        let mut config = *self.last_requested.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        config.set_header(message.header());
        Ok(config)
    }

    /// Requests `req`, forcing `FLAG_SEND_GAINS` so the sonar reports
    /// per-row gains, and blocks until firmware acknowledges it or the
    /// retry budget is exhausted.
    ///
    /// Up to [`MAX_CONFIG_REQUEST_ATTEMPTS`] times: sends the request (via
    /// `dispatch`, since this sans-IO driver has no socket of its own),
    /// waits for the next framed message, and checks it against the
    /// request with [`config::config_equivalent`]. Returns the acknowledged
    /// configuration on a match, or [`OculusError::ConfigUnverified`] once
    /// every attempt has gone unacknowledged.
    pub fn request_ping_config(
        self: &Arc<Self>,
        mut req: PingConfig,
        timeout: Duration,
        mut dispatch: impl FnMut(ClientAction),
    ) -> Result<PingConfig> {
        req.set_flags(req.flags() | config::FLAG_SEND_GAINS);

        for _ in 0..MAX_CONFIG_REQUEST_ATTEMPTS {
            dispatch(self.send_ping_config(req));

            let Ok(message) = self.message_callbacks.wait_once_cloned(timeout) else {
                continue;
            };

            if message.message_id() == ids::DUMMY {
                if config::config_equivalent(&req, ids::DUMMY, &req) {
                    return Ok(req);
                }
                continue;
            }

            let Some(view) = PingView::parse(message.header(), message.data()) else {
                continue;
            };
            let feedback = view.fire_message();
            if config::config_equivalent(&req, message.message_id(), &feedback) {
                return Ok(feedback);
            }
        }

        Err(OculusError::ConfigUnverified { attempts: MAX_CONFIG_REQUEST_ATTEMPTS })
    }
}
