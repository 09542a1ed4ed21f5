// Client core for the booking app: request dispatch, session lifecycle and the booking wizard

pub mod account;
pub mod auth;
pub mod booking;
pub mod client;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod restorer;
pub mod session_store;
pub mod storage;
pub mod transport;
pub mod url_builder;

// Re-export key types for convenience
pub use account::{AccountService, Credentials, Registration};
pub use auth::AuthInjector;
pub use booking::{
    BookingAction, BookingState, BookingStep, BookingWizard, GuestInfo, PaymentInfo,
    PaymentProcessor, Service, SimulatedPaymentProcessor, STEP_SEQUENCE,
};
pub use client::BookingClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ConfigError, RetryConfig};
pub use dispatcher::{Dispatcher, MockedResponse, RequestDescriptor, Upload};
pub use envelope::{ApiEnvelope, PageMeta};
pub use error::{normalize_error, NormalizedError, PaymentError, StorageError, TransportError};
pub use restorer::{AuthStateSink, RestoreOutcome, SessionRestorer, SharedAuthState};
pub use session_store::{SessionRecord, SessionStore, UserSnapshot};
pub use storage::{JsonFileStorage, KeyValueStorage, MemoryStorage};
pub use transport::{HttpMethod, ReqwestTransport, Transport};
pub use url_builder::{build_url, Query};
