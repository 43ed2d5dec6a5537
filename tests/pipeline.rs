use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::io::BufReader;

use voxplay_lib::agent_engine::engine::Session;
use voxplay_lib::agent_engine::state::SessionStats;
use voxplay_lib::config::{AppConfig, GeometryConfig, PlaybackConfig};
use voxplay_lib::errors::{VoxPlayError, VoxPlayResult};
use voxplay_lib::executor::action::{validate, ActionOutcome, RawAction};
use voxplay_lib::executor::coordinator::{map_to_screen, ScreenPoint, WindowRect};
use voxplay_lib::executor::input::{InputPlayer, PointerDriver};
use voxplay_lib::llm::provider::LlmProvider;
use voxplay_lib::llm::types::{CallConfig, ChatMessage, LlmResponse};
use voxplay_lib::perception::traits::WindowSource;
use voxplay_lib::perception::types::WindowCapture;
use voxplay_lib::voice::audio::Utterance;
use voxplay_lib::voice::listener::{LineListener, PhraseSource, SpeechListener};
use voxplay_lib::voice::transcribe::Transcriber;

const WINDOW: WindowRect = WindowRect {
    left: 100,
    top: 50,
    width: 828,
    height: 1374,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Move(ScreenPoint),
    Click,
}

#[derive(Default)]
struct RecordingPointer {
    events: Vec<Event>,
    moves: usize,
    fail_on_move: Option<usize>,
}

impl PointerDriver for RecordingPointer {
    fn location(&mut self) -> VoxPlayResult<ScreenPoint> {
        Ok(ScreenPoint { x: 0, y: 0 })
    }

    fn move_to(&mut self, point: ScreenPoint) -> VoxPlayResult<()> {
        self.moves += 1;
        if self.fail_on_move == Some(self.moves) {
            return Err(VoxPlayError::Executor("permission revoked".into()));
        }
        self.events.push(Event::Move(point));
        Ok(())
    }

    fn click(&mut self) -> VoxPlayResult<()> {
        self.events.push(Event::Click);
        Ok(())
    }
}

struct ScriptedModel {
    replies: Mutex<VecDeque<VoxPlayResult<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<VoxPlayResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> VoxPlayResult<LlmResponse> {
        let body = serde_json::to_string(&messages)?;
        self.calls.lock().unwrap().push(body);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VoxPlayError::Llm("no scripted reply".into())))?;
        Ok(LlmResponse {
            content: reply,
            reasoning: String::new(),
        })
    }
}

struct FixedWindow(Option<WindowRect>);

impl WindowSource for FixedWindow {
    fn capture(&self, title: &str) -> VoxPlayResult<Option<WindowCapture>> {
        Ok(self.0.map(|rect| WindowCapture {
            title: title.to_string(),
            rect,
            image_base64: "iVBORw0KGgo=".into(),
        }))
    }
}

fn instant_config() -> AppConfig {
    AppConfig {
        playback: PlaybackConfig {
            move_duration_ms: 0,
            click_gap_ms: 0,
            cycle_pause_ms: 0,
        },
        ..AppConfig::default()
    }
}

fn session(
    input: &'static [u8],
    window: Option<WindowRect>,
    model: Arc<ScriptedModel>,
) -> Session<RecordingPointer> {
    Session::new(
        instant_config(),
        Box::new(LineListener::new(BufReader::new(input))),
        Box::new(FixedWindow(window)),
        model,
        CallConfig {
            model: "test-model".into(),
            temperature: 0.1,
        },
        RecordingPointer::default(),
    )
}

#[tokio::test]
async fn plays_one_card_then_stops_on_voice_command() {
    let model = ScriptedModel::new(vec![
        Ok("```json\n{\"reasoning\": \"counter the prince\", \"card_slot\": 2, \"grid_x\": 0, \"grid_y\": 0}\n```".into()),
        Ok("{\"reasoning\": \"nothing sensible\", \"card_slot\": null, \"grid_x\": null, \"grid_y\": null}".into()),
    ]);
    let mut session = session(
        b"skeletons on the prince\nplay giant\n\nplease stop program\nnever heard\n",
        Some(WINDOW),
        model.clone(),
    );

    let stats = session.run_loop().await;

    assert_eq!(
        session.driver().events,
        vec![
            Event::Move(ScreenPoint { x: 555, y: 1276 }),
            Event::Click,
            Event::Move(ScreenPoint { x: 246, y: 231 }),
            Event::Click,
        ]
    );
    assert_eq!(
        stats,
        SessionStats {
            cycles: 3,
            plays: 1,
            no_ops: 2,
            failures: 0,
        }
    );
    assert_eq!(model.call_count(), 2);
    let first_call = &model.calls.lock().unwrap()[0];
    assert!(first_call.contains("skeletons on the prince"));
    assert!(first_call.contains("data:image/png;base64,"));
}

#[tokio::test]
async fn missing_window_skips_the_model_and_keeps_looping() {
    let model = ScriptedModel::new(vec![]);
    let mut session = session(b"hog rider bridge\nfireball tower\n", None, model.clone());

    let stats = session.run_loop().await;

    assert_eq!(model.call_count(), 0);
    assert!(session.driver().events.is_empty());
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.cycles, 2);
}

#[tokio::test]
async fn model_failure_does_not_end_the_session() {
    let model = ScriptedModel::new(vec![
        Err(VoxPlayError::Llm("503 Service Unavailable".into())),
        Ok("not json at all".into()),
        Ok("{\"reasoning\": \"bridge\", \"card_slot\": \"4\", \"grid_x\": \"17\", \"grid_y\": 27}".into()),
    ]);
    let mut session = session(b"one\ntwo\nthree\nexit program\n", Some(WINDOW), model.clone());

    let stats = session.run_loop().await;

    assert_eq!(model.call_count(), 3);
    assert_eq!(stats.plays, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.no_ops, 1);
    let clicks = session
        .driver()
        .events
        .iter()
        .filter(|e| **e == Event::Click)
        .count();
    assert_eq!(clicks, 2);
}

#[tokio::test]
async fn out_of_range_reply_never_touches_the_pointer() {
    let model = ScriptedModel::new(vec![Ok(
        "{\"reasoning\": \"far right\", \"card_slot\": 1, \"grid_x\": 18, \"grid_y\": 3}".into(),
    )]);
    let mut session = session(b"knight right\n", Some(WINDOW), model);

    let stats = session.run_loop().await;

    assert!(session.driver().events.is_empty());
    assert_eq!(stats.no_ops, 1);
    assert_eq!(stats.plays, 0);
}

#[tokio::test]
async fn pointer_failure_mid_play_is_reported_not_raised() {
    let geometry = GeometryConfig::default();
    let raw = RawAction {
        reasoning: None,
        card_slot: Some(json!(3)),
        grid_x: Some(json!(8)),
        grid_y: Some(json!(15)),
    };
    let ActionOutcome::Valid(action) = validate(&raw, &geometry) else {
        panic!("expected a valid action");
    };
    let plan = map_to_screen(&action, &WINDOW, &geometry);

    let pointer = RecordingPointer {
        fail_on_move: Some(2),
        ..RecordingPointer::default()
    };
    let mut player = InputPlayer::new(pointer, &instant_config().playback);
    let result = player.execute(&plan).await;

    assert!(matches!(result, Err(VoxPlayError::Executor(_))));
    assert_eq!(
        player.driver().events,
        vec![Event::Move(plan.card_point), Event::Click]
    );
}

/// Phrases whose single sample says what the transcriber should hear.
struct SpokenPhrases(VecDeque<f32>);

#[async_trait]
impl PhraseSource for SpokenPhrases {
    async fn next_phrase(&mut self) -> VoxPlayResult<Utterance> {
        let marker = self.0.pop_front().unwrap_or(4.0);
        Ok(Utterance {
            sample_rate: 16_000,
            samples: vec![marker],
        })
    }
}

struct MarkerTranscriber;

#[async_trait]
impl Transcriber for MarkerTranscriber {
    async fn transcribe(&self, utterance: &Utterance) -> VoxPlayResult<Option<String>> {
        match utterance.samples[0] as i32 {
            1 => Ok(Some("Giant Back Right".into())),
            2 => Ok(None),
            3 => Err(VoxPlayError::Voice("transcription request failed: 503".into())),
            _ => Ok(Some("Stop Program".into())),
        }
    }
}

#[tokio::test]
async fn spoken_commands_drive_the_session() {
    let model = ScriptedModel::new(vec![Ok(
        "{\"reasoning\": \"tank\", \"card_slot\": 1, \"grid_x\": 17, \"grid_y\": 27}".into(),
    )]);
    let listener = SpeechListener::new(
        Box::new(SpokenPhrases(VecDeque::from([1.0, 2.0, 3.0]))),
        Box::new(MarkerTranscriber),
    );
    let mut session = Session::new(
        instant_config(),
        Box::new(listener),
        Box::new(FixedWindow(Some(WINDOW))),
        model.clone(),
        CallConfig {
            model: "test-model".into(),
            temperature: 0.1,
        },
        RecordingPointer::default(),
    );

    let stats = session.run_loop().await;

    assert_eq!(
        stats,
        SessionStats {
            cycles: 3,
            plays: 1,
            no_ops: 1,
            failures: 1,
        }
    );
    assert_eq!(model.call_count(), 1);
    assert!(model.calls.lock().unwrap()[0].contains("giant back right"));
    assert_eq!(
        session.driver().events,
        vec![
            Event::Move(ScreenPoint { x: 413, y: 1277 }),
            Event::Click,
            Event::Move(ScreenPoint { x: 858, y: 1073 }),
            Event::Click,
        ]
    );
}

