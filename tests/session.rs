//! Session behaviour tests.
//!
//! These drive a full [`Session`] with a scripted [`ChatBackend`] and an
//! in-memory [`DocumentLoader`], so they need neither network access nor a
//! pdfium binary and always run.

use futures::future::BoxFuture;
use futures::FutureExt;
use maintenance_agent::prompts::{ESCALATION_NOTE, REFERENCE_END, REFERENCE_START, TURN_INSTRUCTION};
use maintenance_agent::{
    AgentConfig, AgentError, ChatBackend, DocumentLoader, Generated, GenerationRequest,
    ImageAttachment, ManualDocument, ManualUpload, Role, Session, SessionState,
    NO_MANUAL_PLACEHOLDER,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Records every request and answers from a queue.
#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Recorded>>,
}

#[derive(Debug, Clone)]
struct Recorded {
    system_instruction: String,
    prompt: String,
    had_image: bool,
}

impl ScriptedBackend {
    fn new(replies: &[Result<&str, &str>]) -> Arc<Self> {
        let queue = replies
            .iter()
            .copied()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Arc::new(Self {
            replies: Mutex::new(queue),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(&'a self, request: GenerationRequest<'a>) -> BoxFuture<'a, Result<Generated, String>> {
        self.requests.lock().unwrap().push(Recorded {
            system_instruction: request.system_instruction.to_string(),
            prompt: request.prompt.to_string(),
            had_image: request.image.is_some(),
        });
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply left".into()))
            .map(Generated::text);
        futures::future::ready(reply).boxed()
    }
}

/// Treats the bytes as UTF-8 pages separated by `\x0c` (form feed).
/// Bytes starting with `BAD` fail like a corrupt PDF.
#[derive(Default)]
struct TextLoader {
    loads: AtomicUsize,
}

impl DocumentLoader for TextLoader {
    fn load(&self, name: &str, bytes: &[u8]) -> Result<ManualDocument, AgentError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if bytes.starts_with(b"BAD") {
            return Err(AgentError::DocumentRead {
                name: name.to_string(),
                detail: "corrupt xref".into(),
            });
        }
        let text = String::from_utf8_lossy(bytes);
        Ok(ManualDocument::from_pages(name, text.split('\x0c')))
    }
}

fn start(backend: &Arc<ScriptedBackend>, loader: &Arc<TextLoader>) -> Session {
    let config = AgentConfig::builder()
        .api_key("test-key")
        .backend(Arc::clone(backend) as Arc<dyn ChatBackend>)
        .loader(Arc::clone(loader) as Arc<dyn DocumentLoader>)
        .build()
        .expect("valid config");
    Session::start(config).expect("session starts")
}

fn reference_block(instruction: &str) -> &str {
    let start = instruction.find(REFERENCE_START).expect("start marker") + REFERENCE_START.len();
    let end = instruction.find(REFERENCE_END).expect("end marker");
    instruction[start..end].trim()
}

fn tiny_png() -> ImageAttachment {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    ImageAttachment::from_bytes(buf).expect("valid png")
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn new_session_awaits_manual() {
    let session = start(&ScriptedBackend::new(&[]), &Arc::default());
    assert_eq!(session.state(), SessionState::AwaitingManual);
    assert!(session.system_instruction().is_none());
    assert!(session.transcript().is_empty());
}

#[test]
fn continue_without_manual_binds_placeholder() {
    let mut session = start(&ScriptedBackend::new(&[]), &Arc::default());
    session.continue_without_manual().unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    let instruction = session.system_instruction().unwrap();
    assert_eq!(reference_block(instruction), NO_MANUAL_PLACEHOLDER);
}

// ── Manual uploads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_binds_manual_text() {
    let loader = Arc::new(TextLoader::default());
    let mut session = start(&ScriptedBackend::new(&[]), &loader);

    let outcome = session
        .upload_manual("washer.pdf", b"Intro\x0cE01: Contact Authorized Service".to_vec())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ManualUpload::Loaded {
            name: "washer.pdf".into(),
            page_count: 2
        }
    );
    assert_eq!(session.state(), SessionState::Ready);
    let instruction = session.system_instruction().unwrap();
    assert_eq!(
        reference_block(instruction),
        "Intro\nE01: Contact Authorized Service"
    );
}

#[tokio::test]
async fn same_identity_is_not_reprocessed() {
    let loader = Arc::new(TextLoader::default());
    let mut session = start(&ScriptedBackend::new(&[]), &loader);

    session.upload_manual("washer.pdf", b"v1".to_vec()).await.unwrap();
    let before = session.system_instruction().unwrap().to_string();

    // Different bytes, same identity: skipped without reading.
    let outcome = session.upload_manual("washer.pdf", b"BAD".to_vec()).await.unwrap();

    assert_eq!(outcome, ManualUpload::Unchanged { name: "washer.pdf".into() });
    assert!(!outcome.changed());
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(session.system_instruction().unwrap(), before);
}

#[tokio::test]
async fn latest_distinct_manual_wins() {
    let loader = Arc::new(TextLoader::default());
    let mut session = start(&ScriptedBackend::new(&[]), &loader);

    session.upload_manual("a.pdf", b"manual A".to_vec()).await.unwrap();
    session.upload_manual("b.pdf", b"manual B".to_vec()).await.unwrap();
    session.upload_manual("b.pdf", b"manual B".to_vec()).await.unwrap();

    let instruction = session.system_instruction().unwrap();
    assert_eq!(reference_block(instruction), "manual B");
    assert_eq!(session.manual().unwrap().name, "b.pdf");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_upload_keeps_previous_manual() {
    let loader = Arc::new(TextLoader::default());
    let mut session = start(&ScriptedBackend::new(&[]), &loader);

    session.upload_manual("good.pdf", b"torque 12 Nm".to_vec()).await.unwrap();
    let err = session
        .upload_manual("broken.pdf", b"BAD bytes".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::DocumentRead { .. }));
    assert!(!err.is_fatal());
    assert_eq!(session.manual().unwrap().name, "good.pdf");
    assert_eq!(reference_block(session.system_instruction().unwrap()), "torque 12 Nm");
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn failed_first_upload_leaves_no_manual() {
    let mut session = start(&ScriptedBackend::new(&[]), &Arc::default());
    assert!(session.upload_manual("broken.pdf", b"BAD".to_vec()).await.is_err());
    assert!(session.manual().is_none());
    assert_eq!(session.state(), SessionState::AwaitingManual);
}

// ── Submissions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn success_appends_user_and_assistant_turns() {
    let backend = ScriptedBackend::new(&[Ok("Check the drain pump filter.")]);
    let mut session = start(&backend, &Arc::default());

    let before = session.transcript().len();
    let exchange = session.submit("E01 error, what do I do?", None).await.unwrap();

    assert_eq!(exchange.reply, "Check the drain pump filter.");
    assert_eq!(session.transcript().len(), before + 2);
    let turns = session.transcript().all();
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "E01 error, what do I do?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].text, "Check the drain pump filter.");
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn failure_leaves_transcript_unchanged() {
    let backend = ScriptedBackend::new(&[Ok("First answer."), Err("quota exceeded")]);
    let mut session = start(&backend, &Arc::default());

    session.submit("E01?", None).await.unwrap();
    let before = session.transcript().len();

    let err = session.submit("And E02?", None).await.unwrap_err();
    assert!(matches!(err, AgentError::Generation { .. }));
    assert!(!err.is_fatal());
    assert_eq!(session.transcript().len(), before);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn retry_after_failure_does_not_duplicate_question() {
    let backend = ScriptedBackend::new(&[Err("503"), Ok("Replace the thermostat.")]);
    let mut session = start(&backend, &Arc::default());

    assert!(session.submit("Oven won't heat", None).await.is_err());
    session.submit("Oven won't heat", None).await.unwrap();

    let users = session
        .transcript()
        .all()
        .iter()
        .filter(|t| t.role == Role::User)
        .count();
    assert_eq!(users, 1);
    assert!(!backend.requests()[1].prompt.contains("TECHNICIAN (User): Oven won't heat"));
}

#[tokio::test]
async fn history_holds_exactly_the_earlier_turns() {
    let backend = ScriptedBackend::new(&[Ok("Reset the control board."), Ok("Next step.")]);
    let mut session = start(&backend, &Arc::default());

    session.submit("E01 on the display", None).await.unwrap();
    session.submit("What next?", None).await.unwrap();

    let prompt = &backend.requests()[1].prompt;
    let history_start = prompt.find("PREVIOUS CONVERSATION HISTORY:\n").unwrap()
        + "PREVIOUS CONVERSATION HISTORY:\n".len();
    let history_end = prompt.find("CURRENT USER INPUT:").unwrap();
    assert_eq!(
        prompt[history_start..history_end].trim_end(),
        "TECHNICIAN (User): E01 on the display\nSENIOR ENGINEER (You): Reset the control board."
    );
    assert_eq!(prompt.matches("What next?").count(), 1);
}

#[tokio::test]
async fn escalation_prompt_demands_new_advice() {
    let backend = ScriptedBackend::new(&[Ok("Check the fuse."), Ok("Measure the transformer.")]);
    let mut session = start(&backend, &Arc::default());

    session.submit("Machine is dead, no lights", None).await.unwrap();
    session.submit("I checked it, didn't work", None).await.unwrap();

    let prompt = &backend.requests()[1].prompt;
    assert!(prompt.contains(TURN_INSTRUCTION));
    assert!(prompt.contains(ESCALATION_NOTE));
    assert!(prompt.contains("SENIOR ENGINEER (You): Check the fuse."));
    assert!(prompt.contains("TECHNICIAN (User): Machine is dead, no lights"));
}

#[tokio::test]
async fn photo_travels_with_its_turn_only() {
    let backend = ScriptedBackend::new(&[Ok("That capacitor is bulging."), Ok("Yes.")]);
    let mut session = start(&backend, &Arc::default());

    session.submit("What is wrong here?", Some(tiny_png())).await.unwrap();
    session.submit("Should I replace it?", None).await.unwrap();

    let requests = backend.requests();
    assert!(requests[0].had_image);
    assert!(!requests[1].had_image);
    assert!(session.transcript().all()[0].image.is_some());
    assert!(session.transcript().all()[1].image.is_none());
}

#[tokio::test]
async fn submit_without_manual_uses_general_knowledge() {
    let backend = ScriptedBackend::new(&[Ok("### 📚 KAYNAK BİLGİSİ ...")]);
    let mut session = start(&backend, &Arc::default());

    session
        .submit("Kompresör çalışmıyor, ne yapmalıyım?", None)
        .await
        .unwrap();

    let instruction = &backend.requests()[0].system_instruction;
    assert_eq!(reference_block(instruction), NO_MANUAL_PLACEHOLDER);
    assert!(instruction.contains("IF TURKISH"));
    assert!(instruction.contains("ÖNCE GÜVENLİK"));
    assert!(instruction.contains("ADIM ADIM ONARIM TALİMATLARI"));
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn contact_service_manual_gets_override_rule() {
    let backend = ScriptedBackend::new(&[Ok("### ⚠️ SOURCE: GENERAL ENGINEERING KNOWLEDGE")]);
    let loader = Arc::new(TextLoader::default());
    let mut session = start(&backend, &loader);

    session
        .upload_manual(
            "dishwasher.pdf",
            b"Fault E01: Contact Authorized Service.".to_vec(),
        )
        .await
        .unwrap();
    session.submit("E01 error, what do I do?", None).await.unwrap();

    let instruction = &backend.requests()[0].system_instruction;
    assert!(instruction.contains("Fault E01: Contact Authorized Service."));
    assert!(instruction.contains("**DO NOT** tell the user to call support."));
    assert!(instruction.contains("provide the actual repair/replacement steps"));
    assert!(instruction.contains("⚠️ GENERAL KNOWLEDGE"));
}

#[tokio::test]
async fn new_manual_rebinds_following_requests() {
    let backend = ScriptedBackend::new(&[Ok("one"), Ok("two")]);
    let loader = Arc::new(TextLoader::default());
    let mut session = start(&backend, &loader);

    session.submit("hello", None).await.unwrap();
    session.upload_manual("pump.pdf", b"Pump manual".to_vec()).await.unwrap();
    session.submit("E05?", None).await.unwrap();

    let requests = backend.requests();
    assert_eq!(reference_block(&requests[0].system_instruction), NO_MANUAL_PLACEHOLDER);
    assert_eq!(reference_block(&requests[1].system_instruction), "Pump manual");
    // The conversation survives the manual swap.
    assert!(requests[1].prompt.contains("TECHNICIAN (User): hello"));
}

#[tokio::test]
async fn reset_clears_transcript_but_keeps_manual() {
    let backend = ScriptedBackend::new(&[Ok("answer")]);
    let loader = Arc::new(TextLoader::default());
    let mut session = start(&backend, &loader);

    session.upload_manual("pump.pdf", b"Pump manual".to_vec()).await.unwrap();
    session.submit("E05?", None).await.unwrap();
    session.reset();

    assert!(session.transcript().is_empty());
    assert_eq!(session.manual().unwrap().name, "pump.pdf");
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn missing_credential_is_fatal() {
    let no_env_key = maintenance_agent::config::CREDENTIAL_ENV_VARS
        .iter()
        .all(|v| std::env::var(v).map(|k| k.trim().is_empty()).unwrap_or(true));
    if !no_env_key {
        println!("SKIP — a credential is present in the environment");
        return;
    }

    let config = AgentConfig::builder()
        .backend(ScriptedBackend::new(&[]) as Arc<dyn ChatBackend>)
        .build()
        .unwrap();
    let err = Session::start(config).unwrap_err();
    assert!(matches!(err, AgentError::CredentialMissing { .. }));
    assert!(err.is_fatal());
}

#[test]
fn explicit_key_starts_a_gemini_session() {
    // No injected backend: the real Gemini provider is built from the key.
    let config = AgentConfig::builder()
        .api_key("AIza-explicit-test-key")
        .build()
        .unwrap();
    let session = Session::start(config).expect("explicit key should start a session");
    assert_eq!(session.state(), SessionState::AwaitingManual);
}
