// Booking wizard: a linear five-step state machine with derived pricing

use crate::error::PaymentError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// Each guest beyond the first adds this share of the base price
pub const EXTRA_GUEST_SURCHARGE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStep {
    ServiceSelection,
    DateTime,
    GuestInfo,
    Payment,
    Confirmation,
}

// Wizard order. Moving between steps only ever walks this list.
pub const STEP_SEQUENCE: [BookingStep; 5] = [
    BookingStep::ServiceSelection,
    BookingStep::DateTime,
    BookingStep::GuestInfo,
    BookingStep::Payment,
    BookingStep::Confirmation,
];

impl BookingStep {
    pub fn position(self) -> usize {
        STEP_SEQUENCE
            .iter()
            .position(|step| *step == self)
            .unwrap_or(0)
    }

    pub fn next(self) -> Option<BookingStep> {
        STEP_SEQUENCE.get(self.position() + 1).copied()
    }

    pub fn previous(self) -> Option<BookingStep> {
        self.position()
            .checked_sub(1)
            .and_then(|i| STEP_SEQUENCE.get(i))
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub guests: u32,
    #[serde(default)]
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub card_type: String,
    pub last_four: String,
    pub expiry: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingAction {
    Start(Option<Service>),
    SelectService(Service),
    SelectDateTime(NaiveDateTime),
    SubmitGuestInfo(GuestInfo),
    SetPaymentInfo(PaymentInfo),
    PaymentSucceeded(String),
    PaymentFailed(String),
    NextStep,
    PreviousStep,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingState {
    pub current_step: BookingStep,
    pub selected_service: Option<Service>,
    pub selected_date_time: Option<NaiveDateTime>,
    pub guest_info: Option<GuestInfo>,
    pub payment_info: Option<PaymentInfo>,
    pub total_amount: f64,
    pub confirmation_id: Option<String>,
    pub error: Option<String>,
}

impl Default for BookingState {
    fn default() -> Self {
        Self {
            current_step: BookingStep::ServiceSelection,
            selected_service: None,
            selected_date_time: None,
            guest_info: None,
            payment_info: None,
            total_amount: 0.0,
            confirmation_id: None,
            error: None,
        }
    }
}

// Base price plus the extra-guest surcharge
pub fn total_for(base_price: f64, guests: u32) -> f64 {
    if guests > 1 {
        base_price + f64::from(guests - 1) * base_price * EXTRA_GUEST_SURCHARGE
    } else {
        base_price
    }
}

impl BookingState {
    // 1-based, for progress indicators
    pub fn step_number(&self) -> usize {
        self.current_step.position() + 1
    }

    // Returns false when the action does not belong to the current step and
    // was ignored. Forward moves only happen from the step that owns them, so
    // the cursor never jumps over a step.
    pub fn apply(&mut self, action: BookingAction) -> bool {
        match action {
            BookingAction::Start(service) => {
                *self = BookingState::default();
                if let Some(service) = service {
                    self.select_service(service);
                }
            }
            BookingAction::SelectService(service) => {
                if self.current_step != BookingStep::ServiceSelection {
                    return false;
                }
                self.select_service(service);
            }
            BookingAction::SelectDateTime(date_time) => {
                if self.current_step != BookingStep::DateTime {
                    return false;
                }
                self.selected_date_time = Some(date_time);
                self.current_step = BookingStep::GuestInfo;
            }
            BookingAction::SubmitGuestInfo(info) => {
                if self.current_step != BookingStep::GuestInfo {
                    return false;
                }
                if let Some(service) = &self.selected_service {
                    self.total_amount = total_for(service.price, info.guests);
                }
                self.guest_info = Some(info);
                self.current_step = BookingStep::Payment;
            }
            BookingAction::SetPaymentInfo(info) => {
                if self.current_step != BookingStep::Payment {
                    return false;
                }
                self.payment_info = Some(info);
                self.error = None;
            }
            BookingAction::PaymentSucceeded(confirmation_id) => {
                if self.current_step != BookingStep::Payment {
                    return false;
                }
                self.confirmation_id = Some(confirmation_id);
                self.error = None;
                self.current_step = BookingStep::Confirmation;
            }
            BookingAction::PaymentFailed(message) => {
                if self.current_step != BookingStep::Payment {
                    return false;
                }
                self.error = Some(message);
            }
            BookingAction::NextStep => {
                if let Some(next) = self.current_step.next() {
                    self.current_step = next;
                }
            }
            BookingAction::PreviousStep => {
                if let Some(previous) = self.current_step.previous() {
                    self.current_step = previous;
                }
            }
            BookingAction::Reset => *self = BookingState::default(),
        }
        true
    }

    fn select_service(&mut self, service: Service) {
        self.total_amount = service.price;
        self.selected_service = Some(service);
        self.current_step = BookingStep::DateTime;
    }
}

// Placeholder seam until a real payment confirmation contract exists
#[async_trait]
pub trait PaymentProcessor: Send + Sync + 'static {
    async fn process(&self, info: &PaymentInfo, amount: f64) -> Result<String, PaymentError>;
}

pub struct SimulatedPaymentProcessor {
    delay: Duration,
}

impl SimulatedPaymentProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedPaymentProcessor {
    async fn process(&self, info: &PaymentInfo, amount: f64) -> Result<String, PaymentError> {
        tokio::time::sleep(self.delay).await;
        tracing::debug!(card = %info.card_type, amount, "simulated payment accepted");
        Ok(format!("BK{:08}", rand::random::<u32>() % 100_000_000))
    }
}

// Owns the booking state. Every mutation goes through `dispatch`, so
// transitions are applied one at a time. `generation` is bumped by every
// start or reset; a payment that resolves under an older generation is
// dropped instead of confirming a booking that no longer exists.
pub struct BookingWizard {
    inner: Mutex<WizardState>,
    payments: Arc<dyn PaymentProcessor>,
}

struct WizardState {
    booking: BookingState,
    generation: u64,
}

impl WizardState {
    fn apply(&mut self, action: BookingAction) -> bool {
        tracing::debug!(?action, from = ?self.booking.current_step, "booking transition");
        if matches!(action, BookingAction::Start(_) | BookingAction::Reset) {
            self.generation += 1;
        }
        let applied = self.booking.apply(action);
        if !applied {
            tracing::debug!(step = ?self.booking.current_step, "transition ignored");
        }
        applied
    }
}

impl BookingWizard {
    pub fn new(payments: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            inner: Mutex::new(WizardState {
                booking: BookingState::default(),
                generation: 0,
            }),
            payments,
        }
    }

    pub fn state(&self) -> BookingState {
        self.inner.lock().booking.clone()
    }

    pub fn dispatch(&self, action: BookingAction) -> BookingState {
        let mut inner = self.inner.lock();
        inner.apply(action);
        inner.booking.clone()
    }

    pub fn start_booking(&self, service: Option<Service>) -> BookingState {
        self.dispatch(BookingAction::Start(service))
    }

    pub fn select_service(&self, service: Service) -> BookingState {
        self.dispatch(BookingAction::SelectService(service))
    }

    pub fn select_date_time(&self, date_time: NaiveDateTime) -> BookingState {
        self.dispatch(BookingAction::SelectDateTime(date_time))
    }

    pub fn submit_guest_info(&self, info: GuestInfo) -> BookingState {
        self.dispatch(BookingAction::SubmitGuestInfo(info))
    }

    // Only valid on the payment step; the processor is not called otherwise.
    // On failure the wizard stays on the payment step with `error` set.
    pub async fn process_payment(&self, info: PaymentInfo) -> Result<String, PaymentError> {
        let (amount, generation) = {
            let mut inner = self.inner.lock();
            if !inner.apply(BookingAction::SetPaymentInfo(info.clone())) {
                tracing::warn!(step = ?inner.booking.current_step, "payment outside the payment step");
                return Err(PaymentError::NotOnPaymentStep);
            }
            (inner.booking.total_amount, inner.generation)
        };

        let outcome = self.payments.process(&info, amount).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            tracing::warn!(ok = outcome.is_ok(), "booking was reset during payment; result dropped");
            return Err(PaymentError::Superseded);
        }

        match outcome {
            Ok(confirmation_id) => {
                if !inner.apply(BookingAction::PaymentSucceeded(confirmation_id.clone())) {
                    return Err(PaymentError::Superseded);
                }
                tracing::info!(%confirmation_id, amount, "booking confirmed");
                Ok(confirmation_id)
            }
            Err(error) => {
                tracing::warn!(%error, "payment failed");
                inner.apply(BookingAction::PaymentFailed(error.to_string()));
                Err(error)
            }
        }
    }

    pub fn next_step(&self) -> BookingState {
        self.dispatch(BookingAction::NextStep)
    }

    pub fn previous_step(&self) -> BookingState {
        self.dispatch(BookingAction::PreviousStep)
    }

    pub fn reset(&self) -> BookingState {
        self.dispatch(BookingAction::Reset)
    }

    pub fn cancel_booking(&self) -> BookingState {
        self.reset()
    }

    pub fn finish_booking(&self) -> BookingState {
        self.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_case::test_case;

    fn spa(price: f64) -> Service {
        Service {
            id: "svc-1".to_string(),
            name: "Deep Tissue Massage".to_string(),
            price,
            duration_minutes: Some(60),
        }
    }

    fn guests(count: u32) -> GuestInfo {
        GuestInfo {
            name: "Jane Guest".to_string(),
            email: "jane@example.com".to_string(),
            phone: None,
            guests: count,
            special_requests: None,
        }
    }

    fn card() -> PaymentInfo {
        PaymentInfo {
            card_type: "VISA".to_string(),
            last_four: "1234".to_string(),
            expiry: "12/27".to_string(),
            token: Some("tok_123".to_string()),
        }
    }

    fn slot() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 14)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
    }

    struct DecliningProcessor;

    #[async_trait]
    impl PaymentProcessor for DecliningProcessor {
        async fn process(&self, _info: &PaymentInfo, _amount: f64) -> Result<String, PaymentError> {
            Err(PaymentError::Declined("insufficient funds".to_string()))
        }
    }

    fn wizard() -> BookingWizard {
        BookingWizard::new(Arc::new(SimulatedPaymentProcessor::new(Duration::from_secs(2))))
    }

    #[test]
    fn test_select_service_sets_total_and_advances() {
        let wizard = wizard();
        let state = wizard.select_service(spa(1000.0));
        assert_eq!(state.total_amount, 1000.0);
        assert_eq!(state.current_step, BookingStep::DateTime);
    }

    #[test]
    fn test_guest_surcharge() {
        let wizard = wizard();
        wizard.select_service(spa(1000.0));
        wizard.select_date_time(slot());
        let state = wizard.submit_guest_info(guests(3));

        assert!((state.total_amount - 1200.0).abs() < 1e-9);
        assert_eq!(state.current_step, BookingStep::Payment);
        assert_eq!(state.selected_date_time, Some(slot()));
    }

    #[test_case(1000.0, 1, 1000.0 ; "single guest pays base")]
    #[test_case(1000.0, 2, 1100.0 ; "one extra guest")]
    #[test_case(250.0, 5, 350.0 ; "four extra guests")]
    #[test_case(80.0, 0, 80.0 ; "zero guests pays base")]
    fn test_total_for(base: f64, count: u32, expected: f64) {
        assert!((total_for(base, count) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_resubmitting_guests_recomputes_from_base() {
        let mut state = BookingState::default();
        state.apply(BookingAction::SelectService(spa(500.0)));
        state.apply(BookingAction::SelectDateTime(slot()));
        state.apply(BookingAction::SubmitGuestInfo(guests(4)));
        assert!((state.total_amount - 650.0).abs() < 1e-9);

        state.apply(BookingAction::PreviousStep);
        assert_eq!(state.current_step, BookingStep::GuestInfo);
        state.apply(BookingAction::SubmitGuestInfo(guests(1)));
        assert_eq!(state.total_amount, 500.0);
    }

    #[test]
    fn test_cursor_is_clamped_at_both_ends() {
        let mut state = BookingState::default();
        state.apply(BookingAction::PreviousStep);
        assert_eq!(state, BookingState::default());

        for _ in 0..10 {
            state.apply(BookingAction::NextStep);
        }
        assert_eq!(state.current_step, BookingStep::Confirmation);
        assert_eq!(state.step_number(), 5);

        state.apply(BookingAction::NextStep);
        assert_eq!(state.current_step, BookingStep::Confirmation);
    }

    #[test]
    fn test_steps_walk_the_sequence_in_order() {
        let mut step = BookingStep::ServiceSelection;
        let mut visited = vec![step];
        while let Some(next) = step.next() {
            visited.push(next);
            step = next;
        }
        assert_eq!(visited, STEP_SEQUENCE.to_vec());
        assert_eq!(BookingStep::ServiceSelection.previous(), None);
        assert_eq!(BookingStep::Payment.previous(), Some(BookingStep::GuestInfo));
    }

    #[test]
    fn test_reset_cancel_and_finish_restore_defaults() {
        let wizard = wizard();
        wizard.select_service(spa(100.0));
        wizard.select_date_time(slot());
        assert_eq!(wizard.reset(), BookingState::default());

        wizard.select_service(spa(100.0));
        assert_eq!(wizard.cancel_booking(), BookingState::default());

        wizard.select_service(spa(100.0));
        assert_eq!(wizard.finish_booking(), BookingState::default());
    }

    #[test]
    fn test_start_booking_with_preselected_service() {
        let wizard = wizard();
        wizard.select_service(spa(999.0));
        wizard.select_date_time(slot());
        wizard.submit_guest_info(guests(2));

        let state = wizard.start_booking(Some(spa(40.0)));
        assert_eq!(state.current_step, BookingStep::DateTime);
        assert_eq!(state.total_amount, 40.0);
        assert!(state.guest_info.is_none());

        let state = wizard.start_booking(None);
        assert_eq!(state, BookingState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_payment_confirms() {
        let wizard = wizard();
        wizard.select_service(spa(1000.0));
        wizard.select_date_time(slot());
        wizard.submit_guest_info(guests(3));

        let started = tokio::time::Instant::now();
        let confirmation_id = wizard.process_payment(card()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));

        let state = wizard.state();
        assert_eq!(state.current_step, BookingStep::Confirmation);
        assert_eq!(state.confirmation_id.as_deref(), Some(confirmation_id.as_str()));
        assert!(confirmation_id.starts_with("BK"));
        assert_eq!(state.payment_info, Some(card()));
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_payment_does_not_advance() {
        let wizard = BookingWizard::new(Arc::new(DecliningProcessor));
        wizard.select_service(spa(1000.0));
        wizard.select_date_time(slot());
        wizard.submit_guest_info(guests(1));

        let result = wizard.process_payment(card()).await;
        assert_eq!(
            result,
            Err(PaymentError::Declined("insufficient funds".to_string()))
        );

        let state = wizard.state();
        assert_eq!(state.current_step, BookingStep::Payment);
        assert!(state.confirmation_id.is_none());
        assert!(state.error.unwrap().contains("insufficient funds"));
    }

    #[test]
    fn test_forward_actions_only_apply_on_their_own_step() {
        let mut state = BookingState::default();
        assert!(!state.apply(BookingAction::SubmitGuestInfo(guests(2))));
        assert!(!state.apply(BookingAction::SelectDateTime(slot())));
        assert!(!state.apply(BookingAction::PaymentSucceeded("BK00000001".to_string())));
        assert_eq!(state, BookingState::default());

        assert!(state.apply(BookingAction::SelectService(spa(100.0))));
        assert!(!state.apply(BookingAction::SelectService(spa(200.0))));
        assert_eq!(state.total_amount, 100.0);

        state.apply(BookingAction::SelectDateTime(slot()));
        assert!(!state.apply(BookingAction::PaymentFailed("declined".to_string())));
        assert!(state.error.is_none());
        assert_eq!(state.current_step, BookingStep::GuestInfo);
    }

    #[test]
    fn test_every_transition_moves_at_most_one_step_forward() {
        let actions = vec![
            BookingAction::PaymentSucceeded("BK1".to_string()),
            BookingAction::SubmitGuestInfo(guests(2)),
            BookingAction::SelectService(spa(100.0)),
            BookingAction::PaymentSucceeded("BK2".to_string()),
            BookingAction::SubmitGuestInfo(guests(2)),
            BookingAction::SelectDateTime(slot()),
            BookingAction::PaymentSucceeded("BK3".to_string()),
            BookingAction::SubmitGuestInfo(guests(2)),
            BookingAction::PreviousStep,
            BookingAction::NextStep,
            BookingAction::SetPaymentInfo(card()),
            BookingAction::PaymentSucceeded("BK4".to_string()),
            BookingAction::NextStep,
        ];

        let mut state = BookingState::default();
        for action in actions {
            let before = state.current_step.position();
            state.apply(action);
            assert!(state.current_step.position() <= before + 1);
        }
        assert_eq!(state.current_step, BookingStep::Confirmation);
        assert_eq!(state.confirmation_id.as_deref(), Some("BK4"));
    }

    #[tokio::test]
    async fn test_payment_outside_payment_step_is_rejected() {
        let wizard = BookingWizard::new(Arc::new(DecliningProcessor));
        wizard.select_service(spa(1000.0));

        let result = wizard.process_payment(card()).await;
        assert_eq!(result, Err(PaymentError::NotOnPaymentStep));

        let state = wizard.state();
        assert_eq!(state.current_step, BookingStep::DateTime);
        assert!(state.payment_info.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_payment_drops_the_confirmation() {
        let wizard = Arc::new(wizard());
        wizard.select_service(spa(1000.0));
        wizard.select_date_time(slot());
        wizard.submit_guest_info(guests(2));

        let paying = tokio::spawn({
            let wizard = wizard.clone();
            async move { wizard.process_payment(card()).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        wizard.cancel_booking();

        let result = paying.await.unwrap();
        assert_eq!(result, Err(PaymentError::Superseded));
        assert_eq!(wizard.state(), BookingState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_payment_keeps_the_new_booking() {
        let wizard = Arc::new(wizard());
        wizard.select_service(spa(1000.0));
        wizard.select_date_time(slot());
        wizard.submit_guest_info(guests(1));

        let paying = tokio::spawn({
            let wizard = wizard.clone();
            async move { wizard.process_payment(card()).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        wizard.start_booking(Some(spa(40.0)));
        wizard.select_date_time(slot());
        wizard.submit_guest_info(guests(1));

        assert_eq!(paying.await.unwrap(), Err(PaymentError::Superseded));
        let state = wizard.state();
        assert_eq!(state.current_step, BookingStep::Payment);
        assert_eq!(state.total_amount, 40.0);
        assert!(state.confirmation_id.is_none());
    }

    #[test]
    fn test_step_names_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&BookingStep::ServiceSelection).unwrap(),
            "\"SERVICE_SELECTION\""
        );
        assert_eq!(
            serde_json::from_str::<BookingStep>("\"DATE_TIME\"").unwrap(),
            BookingStep::DateTime
        );
    }
}
