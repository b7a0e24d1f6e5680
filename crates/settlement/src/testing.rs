//! In-memory doubles for the settlement collaborators
//!
//! Test builds only. Production wiring never touches these; tests inject
//! them through the same trait seams the Postgres/HTTP implementations use.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::catalog::{ArtProductDetails, BookingCatalog, CourseDetails, GiftCardRecord};
use crate::client::{PaymentProvider, PaymentRequest, ProviderPaymentDoc};
use crate::error::{SettlementError, SettlementResult};
use crate::jobs::{BackgroundJob, JobStatus, JobStore, JobType};
use crate::mail::{Mailer, OutgoingEmail};
use crate::payment::{
    evaluate_transition, NewPayment, PaymentRecord, PaymentStatus, ProductType, StatusSource,
    TransitionOutcome,
};
use crate::pdf::{GiftCardData, InvoiceData, InvoiceRenderer};
use crate::processor::JobProcessor;
use crate::reconcile::{CheckDepth, StatusProbe};
use crate::store::PaymentStore;
use crate::SettlementService;

// =========================================================================
// Payment store
// =========================================================================

#[derive(Default)]
pub struct MemoryPaymentStore {
    inner: Mutex<PaymentStoreInner>,
}

#[derive(Default)]
struct PaymentStoreInner {
    payments: HashMap<String, PaymentRecord>,
    fulfillments: HashSet<String>,
}

impl MemoryPaymentStore {
    pub fn status_of(&self, reference: &str) -> Option<PaymentStatus> {
        self.inner
            .lock()
            .unwrap()
            .payments
            .get(reference)
            .map(|p| p.status)
    }

    pub fn fulfillment_count(&self) -> usize {
        self.inner.lock().unwrap().fulfillments.len()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn insert(&self, new: NewPayment) -> SettlementResult<PaymentRecord> {
        let mut inner = self.inner.lock().unwrap();
        if inner.payments.contains_key(&new.reference) {
            return Err(SettlementError::Validation(format!(
                "payment reference '{}' already exists",
                new.reference
            )));
        }
        let now = OffsetDateTime::now_utc();
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            reference: new.reference.clone(),
            provider_payment_id: None,
            status: PaymentStatus::Created,
            amount_ore: new.amount_ore,
            currency: new.currency,
            product_type: new.product_type,
            product_id: new.product_id,
            payer_contact: new.payer_contact,
            customer_email: new.customer_email,
            message: new.message,
            booking_id: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        inner.payments.insert(new.reference, record.clone());
        Ok(record)
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> SettlementResult<Option<PaymentRecord>> {
        Ok(self.inner.lock().unwrap().payments.get(reference).cloned())
    }

    async fn record_provider_id(
        &self,
        reference: &str,
        provider_payment_id: &str,
    ) -> SettlementResult<()> {
        if let Some(record) = self.inner.lock().unwrap().payments.get_mut(reference) {
            record.provider_payment_id = Some(provider_payment_id.to_string());
        }
        Ok(())
    }

    async fn transition(
        &self,
        reference: &str,
        proposed: PaymentStatus,
        source: StatusSource,
    ) -> SettlementResult<TransitionOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.payments.get_mut(reference).ok_or_else(|| {
            SettlementError::NotFound(format!("payment '{reference}' not found"))
        })?;

        let outcome = evaluate_transition(record.status, proposed);
        if outcome == TransitionOutcome::Applied {
            record.status = proposed;
            record.updated_at = OffsetDateTime::now_utc();
            record.history.push(crate::payment::AuditEntry {
                status: proposed,
                source,
                at: record.updated_at,
            });
        }
        Ok(outcome)
    }

    async fn record_booking(&self, reference: &str, booking_id: Uuid) -> SettlementResult<()> {
        if let Some(record) = self.inner.lock().unwrap().payments.get_mut(reference) {
            record.booking_id = Some(booking_id);
        }
        Ok(())
    }

    async fn claim_fulfillment(&self, reference: &str) -> SettlementResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .fulfillments
            .insert(reference.to_string()))
    }

    async fn record_fulfillment(
        &self,
        _reference: &str,
        _booking_id: Option<Uuid>,
        _job_id: Option<Uuid>,
    ) -> SettlementResult<()> {
        Ok(())
    }

    async fn stale_created(
        &self,
        older_than: std::time::Duration,
        limit: i64,
    ) -> SettlementResult<Vec<PaymentRecord>> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let mut stale: Vec<PaymentRecord> = self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Created && p.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.created_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

// =========================================================================
// Job store
// =========================================================================

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<BackgroundJob>>,
}

impl MemoryJobStore {
    pub fn all(&self) -> Vec<BackgroundJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn of_type(&self, job_type: JobType) -> Vec<BackgroundJob> {
        self.all()
            .into_iter()
            .filter(|j| j.job_type == job_type.as_str())
            .collect()
    }

    /// Insert a job with an arbitrary type string, bypassing the enum. Used
    /// to exercise the processor's unknown-type path.
    pub fn push_raw(&self, job_type: &str, job_data: serde_json::Value) -> Uuid {
        let now = OffsetDateTime::now_utc();
        let job = BackgroundJob {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            job_data,
            status: JobStatus::Pending,
            result_success: None,
            result_error: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;
        self.jobs.lock().unwrap().push(job);
        id
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(
        &self,
        job_type: JobType,
        job_data: serde_json::Value,
    ) -> SettlementResult<BackgroundJob> {
        let now = OffsetDateTime::now_utc();
        let job = BackgroundJob {
            id: Uuid::new_v4(),
            job_type: job_type.as_str().to_string(),
            job_data,
            status: JobStatus::Pending,
            result_success: None,
            result_error: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn claim_next(&self) -> SettlementResult<Option<BackgroundJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        // Vec order is insertion order, which is creation order.
        if let Some(job) = jobs.iter_mut().find(|j| j.status == JobStatus::Pending) {
            job.status = JobStatus::Processing;
            job.updated_at = OffsetDateTime::now_utc();
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn complete(&self, id: Uuid) -> SettlementResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Completed;
            job.result_success = Some(true);
            job.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> SettlementResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Failed;
            job.result_success = Some(false);
            job.result_error = Some(error.to_string());
            job.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn find(&self, id: Uuid) -> SettlementResult<Option<BackgroundJob>> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn purge_completed(&self, older_than: std::time::Duration) -> SettlementResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| !(j.status == JobStatus::Completed && j.updated_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }
}

// =========================================================================
// Provider
// =========================================================================

/// Provider double with a scripted sequence of status answers. Once the
/// script runs out, the last status repeats.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<PaymentStatus>>,
    last: Mutex<PaymentStatus>,
    pub create_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fail_create: AtomicBool,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(PaymentStatus::Created),
            create_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
        }
    }
}

impl ScriptedProvider {
    pub fn with_script(statuses: impl IntoIterator<Item = PaymentStatus>) -> Self {
        let provider = Self::default();
        *provider.script.lock().unwrap() = statuses.into_iter().collect();
        provider
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn create_payment(&self, request: &PaymentRequest) -> SettlementResult<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SettlementError::Api {
                status: 500,
                error_code: None,
                message: "scripted create failure".to_string(),
            });
        }
        Ok(format!("PID-{}", request.reference))
    }

    async fn fetch_payment(
        &self,
        provider_payment_id: &str,
    ) -> SettlementResult<ProviderPaymentDoc> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let status = {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(status) => {
                    *self.last.lock().unwrap() = status;
                    status
                }
                None => *self.last.lock().unwrap(),
            }
        };
        Ok(ProviderPaymentDoc {
            id: provider_payment_id.to_string(),
            status,
            amount_ore: 10000,
            currency: "SEK".to_string(),
            error_code: None,
            error_message: None,
        })
    }
}

/// Probe double for exercising the polling loop in isolation.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<PaymentStatus>>,
    pub calls: AtomicUsize,
    pub depths: Mutex<Vec<CheckDepth>>,
}

impl ScriptedProbe {
    pub fn new(statuses: impl IntoIterator<Item = PaymentStatus>) -> Self {
        Self {
            script: Mutex::new(statuses.into_iter().collect()),
            calls: AtomicUsize::new(0),
            depths: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StatusProbe for ScriptedProbe {
    async fn check(
        &self,
        _reference: &str,
        depth: CheckDepth,
    ) -> SettlementResult<PaymentStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.depths.lock().unwrap().push(depth);
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PaymentStatus::Created))
    }
}

// =========================================================================
// Catalog
// =========================================================================

struct StoredGiftCard {
    record: GiftCardRecord,
    payment_reference: Option<String>,
}

#[derive(Default)]
struct CatalogInner {
    bookings: Vec<(Uuid, String)>,
    gift_cards: Vec<StoredGiftCard>,
    courses: HashMap<String, CourseDetails>,
    art_products: HashMap<String, ArtProductDetails>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<CatalogInner>,
    pub fail_course_lookup: AtomicBool,
}

impl MemoryCatalog {
    pub fn bookings_for(&self, reference: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .bookings
            .iter()
            .filter(|(_, r)| r == reference)
            .count()
    }

    pub fn add_course(&self, id: &str, details: CourseDetails) {
        self.inner
            .lock()
            .unwrap()
            .courses
            .insert(id.to_string(), details);
    }

    /// Seed a gift card with only the given lookup keys populated, to
    /// exercise the processor's fallback search.
    pub fn add_gift_card(
        &self,
        payment_reference: Option<&str>,
        code: &str,
        invoice_number: Option<&str>,
        amount_ore: i64,
    ) {
        self.inner.lock().unwrap().gift_cards.push(StoredGiftCard {
            record: GiftCardRecord {
                id: Uuid::new_v4(),
                code: code.to_string(),
                amount_ore,
                invoice_number: invoice_number.map(str::to_string),
                recipient_email: None,
            },
            payment_reference: payment_reference.map(str::to_string),
        });
    }
}

#[async_trait]
impl BookingCatalog for MemoryCatalog {
    async fn create_booking(
        &self,
        payment_reference: &str,
        _product_type: ProductType,
        _product_id: Option<&str>,
        _customer_contact: &str,
    ) -> SettlementResult<Uuid> {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .bookings
            .push((id, payment_reference.to_string()));
        Ok(id)
    }

    async fn issue_gift_card(
        &self,
        payment_reference: &str,
        amount_ore: i64,
        recipient_email: Option<&str>,
    ) -> SettlementResult<GiftCardRecord> {
        let record = GiftCardRecord {
            id: Uuid::new_v4(),
            code: format!("GC-{}", Uuid::new_v4().simple()).to_uppercase(),
            amount_ore,
            invoice_number: None,
            recipient_email: recipient_email.map(str::to_string),
        };
        self.inner.lock().unwrap().gift_cards.push(StoredGiftCard {
            record: record.clone(),
            payment_reference: Some(payment_reference.to_string()),
        });
        Ok(record)
    }

    async fn course_details(&self, course_id: &str) -> SettlementResult<CourseDetails> {
        if self.fail_course_lookup.load(Ordering::SeqCst) {
            return Err(SettlementError::Collaborator(
                "scripted course lookup failure".to_string(),
            ));
        }
        self.inner
            .lock()
            .unwrap()
            .courses
            .get(course_id)
            .cloned()
            .ok_or_else(|| SettlementError::NotFound(format!("course '{course_id}' not found")))
    }

    async fn art_product_details(&self, product_id: &str) -> SettlementResult<ArtProductDetails> {
        self.inner
            .lock()
            .unwrap()
            .art_products
            .get(product_id)
            .cloned()
            .ok_or_else(|| {
                SettlementError::NotFound(format!("art product '{product_id}' not found"))
            })
    }

    async fn gift_card_by_reference(
        &self,
        payment_reference: &str,
    ) -> SettlementResult<Option<GiftCardRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .gift_cards
            .iter()
            .find(|g| g.payment_reference.as_deref() == Some(payment_reference))
            .map(|g| g.record.clone()))
    }

    async fn gift_card_by_code(&self, code: &str) -> SettlementResult<Option<GiftCardRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .gift_cards
            .iter()
            .find(|g| g.record.code == code)
            .map(|g| g.record.clone()))
    }

    async fn gift_card_by_invoice_number(
        &self,
        invoice_number: &str,
    ) -> SettlementResult<Option<GiftCardRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .gift_cards
            .iter()
            .find(|g| g.record.invoice_number.as_deref() == Some(invoice_number))
            .map(|g| g.record.clone()))
    }
}

// =========================================================================
// Delivery collaborators
// =========================================================================

#[derive(Default)]
pub struct StubRenderer {
    pub fail_invoice: AtomicBool,
    pub fail_gift_card: AtomicBool,
}

#[async_trait]
impl InvoiceRenderer for StubRenderer {
    async fn render_invoice(&self, _invoice: &InvoiceData) -> SettlementResult<Vec<u8>> {
        if self.fail_invoice.load(Ordering::SeqCst) {
            return Err(SettlementError::Collaborator(
                "scripted invoice render failure".to_string(),
            ));
        }
        Ok(b"%PDF-invoice".to_vec())
    }

    async fn render_gift_card(&self, _gift_card: &GiftCardData) -> SettlementResult<Vec<u8>> {
        if self.fail_gift_card.load(Ordering::SeqCst) {
            return Err(SettlementError::Collaborator(
                "scripted gift card render failure".to_string(),
            ));
        }
        Ok(b"%PDF-giftcard".to_vec())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> SettlementResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SettlementError::Collaborator(
                "scripted mail failure".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryArtifacts {
    pub stored: Mutex<HashMap<String, Vec<u8>>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn put_pdf(&self, key: &str, bytes: &[u8]) -> SettlementResult<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SettlementError::Collaborator(
                "scripted storage failure".to_string(),
            ));
        }
        self.stored
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("memory://{key}"))
    }
}

// =========================================================================
// Harnesses
// =========================================================================

pub struct TestHarness {
    pub service: SettlementService,
    pub store: Arc<MemoryPaymentStore>,
    pub jobs: Arc<MemoryJobStore>,
    pub provider: Arc<ScriptedProvider>,
    pub catalog: Arc<MemoryCatalog>,
}

pub fn harness() -> TestHarness {
    harness_with_provider(ScriptedProvider::default())
}

pub fn harness_with_provider(provider: ScriptedProvider) -> TestHarness {
    let store = Arc::new(MemoryPaymentStore::default());
    let jobs = Arc::new(MemoryJobStore::default());
    let provider = Arc::new(provider);
    let catalog = Arc::new(MemoryCatalog::default());
    let service = SettlementService::new(
        store.clone(),
        provider.clone(),
        jobs.clone(),
        catalog.clone(),
    );
    TestHarness {
        service,
        store,
        jobs,
        provider,
        catalog,
    }
}

pub struct ProcessorHarness {
    pub processor: JobProcessor,
    pub jobs: Arc<MemoryJobStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub renderer: Arc<StubRenderer>,
    pub mailer: Arc<RecordingMailer>,
    pub artifacts: Arc<MemoryArtifacts>,
}

pub fn processor_harness(jobs: Arc<MemoryJobStore>) -> ProcessorHarness {
    let catalog = Arc::new(MemoryCatalog::default());
    let renderer = Arc::new(StubRenderer::default());
    let mailer = Arc::new(RecordingMailer::default());
    let artifacts = Arc::new(MemoryArtifacts::default());
    let processor = JobProcessor::new(
        jobs.clone(),
        catalog.clone(),
        renderer.clone(),
        mailer.clone(),
        artifacts.clone(),
    );
    ProcessorHarness {
        processor,
        jobs,
        catalog,
        renderer,
        mailer,
        artifacts,
    }
}
