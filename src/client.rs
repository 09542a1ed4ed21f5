// Wires the session store, dispatcher, account service, restorer and wizard together

use crate::account::AccountService;
use crate::auth::AuthInjector;
use crate::booking::{BookingWizard, PaymentProcessor, SimulatedPaymentProcessor};
use crate::clock::{Clock, SystemClock};
use crate::config::{ClientConfig, ConfigError};
use crate::dispatcher::Dispatcher;
use crate::restorer::SessionRestorer;
use crate::session_store::SessionStore;
use crate::storage::KeyValueStorage;
use crate::transport::Transport;
use std::sync::Arc;

pub struct BookingClient {
    pub config: ClientConfig,
    pub session_store: Arc<SessionStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub account: AccountService,
    pub restorer: SessionRestorer,
    pub wizard: BookingWizard,
}

impl BookingClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ConfigError> {
        let payments = Arc::new(SimulatedPaymentProcessor::new(config.payment_delay()));
        Self::with_parts(config, transport, storage, Arc::new(SystemClock), payments)
    }

    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ttl = config
            .session_ttl()
            .ok_or(ConfigError::InvalidSessionTtl(config.session_ttl_secs))?;

        let session_store = Arc::new(SessionStore::new(storage, clock, ttl));
        let auth = Arc::new(AuthInjector::new(
            session_store.clone(),
            config.public_endpoints.iter().cloned(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(transport, auth, &config));

        tracing::debug!(base_url = %config.base_url, "booking client initialised");

        Ok(Self {
            account: AccountService::new(dispatcher.clone(), session_store.clone()),
            restorer: SessionRestorer::new(session_store.clone(), config.min_splash()),
            wizard: BookingWizard::new(payments),
            session_store,
            dispatcher,
            config,
        })
    }
}
