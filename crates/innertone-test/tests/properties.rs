//! Property tests over dialogue traffic and animation output

use innertone_core::{SessionMode, SessionState};
use innertone_runtime::UserAction;
use innertone_test::SessionHarness;
use innertone_visual::{AnimationConfig, AvatarAnimator, CharacterRig, Viseme};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Frame(String),
    FinishSegment,
    Utterance(String),
}

fn frame() -> impl Strategy<Value = String> {
    let state = prop_oneof![
        Just(None),
        Just(Some("idle")),
        Just(Some("listening")),
        Just(Some("thinking")),
        Just(Some("speaking")),
        Just(Some("bogus")),
    ];
    let transcript = prop_oneof![
        Just(None),
        Just(Some("")),
        Just(Some("Okay.")),
        Just(Some("Breathe in. Breathe out!")),
    ];
    (state, transcript).prop_map(|(state, transcript)| {
        let mut value = serde_json::Map::new();
        if let Some(s) = state {
            value.insert("state".into(), s.into());
        }
        if let Some(t) = transcript {
            value.insert("transcript".into(), t.into());
        }
        serde_json::Value::Object(value).to_string()
    })
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => frame().prop_map(Step::Frame),
        2 => Just(Step::FinishSegment),
        1 => "[a-z ]{0,12}".prop_map(Step::Utterance),
        1 => Just(Step::Frame("{not json".to_string())),
    ]
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_dialogue_traffic_keeps_session_connected(steps in prop::collection::vec(step(), 0..40)) {
        block_on(async {
            let mut h = SessionHarness::new();
            h.start(SessionMode::AiVoice).await.unwrap();

            for step in steps {
                match step {
                    Step::Frame(raw) => h.server_says(&raw).await,
                    Step::FinishSegment => {
                        h.speech.finish_segment();
                        h.settle().await;
                    }
                    Step::Utterance(text) => {
                        if h.act(UserAction::StartListening).await.is_ok() {
                            h.user_says(&text).await;
                        }
                    }
                }

                let state = h.state();
                prop_assert!(state.is_connected(), "left the session: {state:?}");
                // Playback only while speaking
                if h.speech.is_playing() {
                    prop_assert_eq!(state, SessionState::Speaking);
                }
                prop_assert!(h.snapshot().error.is_none());
            }

            h.server_says(r#"{"state":"listening"}"#).await;
            prop_assert_eq!(h.state(), SessionState::Listening);
            prop_assert!(!h.speech.is_playing());
            Ok(())
        })?;
    }

    #[test]
    fn prop_animation_stays_in_range(
        seed in any::<u64>(),
        basic in any::<bool>(),
        steps in prop::collection::vec((0.0f32..0.5, 0usize..4, 0.0f32..1.0), 1..200),
    ) {
        let config = AnimationConfig::default();
        let rig = if basic { CharacterRig::basic() } else { CharacterRig::full() };
        let mut animator = AvatarAnimator::seeded(config.clone(), rig, seed);
        let states = [
            SessionState::Idle,
            SessionState::Listening,
            SessionState::Thinking,
            SessionState::Speaking,
        ];

        let mut t = 0.0f32;
        for (dt, state, level) in steps {
            t += dt;
            let frame = animator.tick(t, Some(states[state]), Some(level));

            prop_assert!((0.0..=1.0).contains(&frame.blink_influence));
            prop_assert!((0.0..=1.0).contains(&frame.jaw_open));
            for viseme in Viseme::all() {
                prop_assert!((0.0..=1.0).contains(&frame.viseme(*viseme)));
            }
            prop_assert!(frame.head_yaw.abs() <= config.drift_yaw + 1e-4);
            prop_assert!(frame.head_pitch.abs() <= config.drift_pitch + 1e-4);
            prop_assert!((frame.breath_scale - 1.0).abs() <= config.breath_amplitude + 1e-4);
            prop_assert!(frame.fallback_talk_scale >= 1.0);
            prop_assert!(frame.fallback_talk_scale <= 1.0 + config.fallback_scale_gain + 1e-4);
        }
    }
}
