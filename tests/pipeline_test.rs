// tests/pipeline_test.rs
// Relay behaviour end to end with scripted upstream sources
//
// Covers:
// 1. Terminal sentinel: exactly one, always last
// 2. Hand-off text reaching the answer history
// 3. Reasoning faults and empty reasoning falling back to the placeholder
// 4. System messages never reaching the answer source
// 5. Answer faults still terminating the stream
// 6. Non-streaming completions keeping the request identity
// 7. Concurrent requests staying independent
// 8. Dropping the stream releasing both upstreams

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;

use common::*;
use deepclaude::pipeline::{
    DeepClaude, OutboundFrame, REASONING_PLACEHOLDER, RequestIdentity, reasoning_preamble,
};
use deepclaude::provider::{ChatMessage, StreamEvent};

const LIMIT: Duration = Duration::from_secs(5);

async fn run(relay: &DeepClaude, messages: Vec<ChatMessage>) -> Vec<OutboundFrame> {
    timeout(LIMIT, relay.stream(request(messages)).collect::<Vec<_>>())
        .await
        .expect("relay stream did not terminate")
}

fn assert_terminated(frames: &[OutboundFrame]) {
    let done = frames.iter().filter(|f| f.is_done()).count();
    assert_eq!(done, 1, "exactly one terminal sentinel");
    assert!(frames.last().is_some_and(|f| f.is_done()), "sentinel must be last");
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn test_reasoning_then_answer() {
    let answerer = RecordingAnswerer::new(vec![answer("Four"), answer(".")]);
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("a"), reasoning("b"), content("4")]),
        answerer.clone(),
    );

    let frames = run(&relay, vec![ChatMessage::user("What is 2+2?")]).await;

    assert_terminated(&frames);
    assert_eq!(reasoning_texts(&frames), vec!["a", "b"]);
    assert_eq!(answer_texts(&frames), vec!["Four", "."]);

    // Reasoning chunks carry empty content
    for chunk in chunks(&frames).iter().take(2) {
        let delta = chunk.delta().unwrap();
        assert_eq!(delta.content, "");
        assert_eq!(delta.role, "assistant");
        assert_eq!(chunk.model, "deepseek-reasoner");
    }

    let histories = answerer.histories();
    assert_eq!(histories.len(), 1, "answer source called once");
    assert_eq!(
        histories[0],
        vec![
            ChatMessage::user("What is 2+2?"),
            ChatMessage::assistant(
                "Here's my reasoning process:\nab\n\nBased on this reasoning, I will now provide my response:"
            ),
        ]
    );
}

#[tokio::test]
async fn test_content_marker_not_forwarded() {
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![
            reasoning("x"),
            content("leaked answer"),
            reasoning("after marker"),
        ]),
        RecordingAnswerer::new(vec![answer("y")]),
    );

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;

    assert_terminated(&frames);
    assert_eq!(reasoning_texts(&frames), vec!["x"]);
    assert_eq!(answer_texts(&frames), vec!["y"]);
    assert!(
        chunks(&frames)
            .iter()
            .all(|c| c.delta().unwrap().content != "leaked answer")
    );
}

#[tokio::test]
async fn test_reasoning_precedes_answer() {
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("r1"), reasoning("r2"), reasoning("r3"), content("")]),
        Arc::new(EchoAnswerer),
    );

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;
    let kinds: Vec<bool> = chunks(&frames)
        .iter()
        .map(|c| c.delta().unwrap().reasoning_content.is_some())
        .collect();

    let first_answer = kinds.iter().position(|r| !r).expect("answer chunks present");
    assert!(kinds[..first_answer].iter().all(|r| *r));
    assert!(kinds[first_answer..].iter().all(|r| !r));
}

#[tokio::test]
async fn test_identity_threaded_through_every_chunk() {
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("t"), content("")]),
        RecordingAnswerer::new(vec![answer("a"), answer("b")]),
    );
    let identity = RequestIdentity {
        id: "chatcmpl-pinned".into(),
        created: 1_700_000_123,
    };

    let frames: Vec<OutboundFrame> = timeout(
        LIMIT,
        relay
            .stream_with_identity(request(vec![ChatMessage::user("q")]), identity)
            .collect::<Vec<_>>(),
    )
    .await
    .unwrap();

    assert_eq!(chunks(&frames).len(), 3);
    for chunk in chunks(&frames) {
        assert_eq!(chunk.id, "chatcmpl-pinned");
        assert_eq!(chunk.created, 1_700_000_123);
        assert_eq!(chunk.object, "chat.completion.chunk");
    }
    assert_eq!(
        frames.last().map(OutboundFrame::to_sse).as_deref(),
        Some("data: [DONE]\n\n")
    );
}

// ============================================================================
// SYSTEM MESSAGES
// ============================================================================

#[tokio::test]
async fn test_system_messages_never_reach_answer_source() {
    let answerer = RecordingAnswerer::new(vec![answer("ok")]);
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("r"), content("")]),
        answerer.clone(),
    );

    let input = vec![
        ChatMessage::system("You are terse"),
        ChatMessage::user("first"),
        ChatMessage::assistant("reply"),
        ChatMessage::system("Another rule"),
        ChatMessage::user("second"),
    ];
    let frames = run(&relay, input).await;
    assert_terminated(&frames);

    let history = &answerer.histories()[0];
    assert!(history.iter().all(|m| !m.is_system()));
    let roles: Vec<&str> = history.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
    assert_eq!(history[0].content, "first");
    assert_eq!(history[2].content, "second");
    assert_eq!(history[3].content, reasoning_preamble("r"));
}

// ============================================================================
// REASONING FAULTS
// ============================================================================

#[tokio::test]
async fn test_reasoning_connect_fault_uses_placeholder() {
    let reasoner = ScriptedReasoner::refusing();
    let answerer = RecordingAnswerer::new(vec![answer("still answering")]);
    let relay = DeepClaude::new(reasoner.clone(), answerer.clone());

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;

    assert_terminated(&frames);
    assert!(reasoning_texts(&frames).is_empty());
    assert_eq!(answer_texts(&frames), vec!["still answering"]);
    assert_eq!(
        answerer.histories()[0].last().unwrap().content,
        reasoning_preamble(REASONING_PLACEHOLDER)
    );
    assert_eq!(reasoner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reasoning_midstream_fault_discards_fragments() {
    let answerer = RecordingAnswerer::new(vec![answer("done")]);
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("partial"), fault("connection reset")]),
        answerer.clone(),
    );

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;

    assert_terminated(&frames);
    // Already-forwarded fragments stay in the output
    assert_eq!(reasoning_texts(&frames), vec!["partial"]);
    // but the hand-off is empty, so the placeholder is used
    assert_eq!(
        answerer.histories()[0].last().unwrap().content,
        reasoning_preamble(REASONING_PLACEHOLDER)
    );
    assert_eq!(answer_texts(&frames), vec!["done"]);
}

#[tokio::test]
async fn test_empty_reasoning_source() {
    let answerer = RecordingAnswerer::new(vec![answer("fallback")]);
    let relay = DeepClaude::new(ScriptedReasoner::new(vec![]), answerer.clone());

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;

    assert_terminated(&frames);
    assert_eq!(answer_texts(&frames), vec!["fallback"]);
    assert!(
        answerer.histories()[0]
            .last()
            .unwrap()
            .content
            .contains(REASONING_PLACEHOLDER)
    );
}

#[tokio::test]
async fn test_exhaustion_without_marker_hands_off_accumulated() {
    let answerer = RecordingAnswerer::new(vec![answer("x")]);
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("only "), reasoning("thoughts")]),
        answerer.clone(),
    );

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;

    assert_terminated(&frames);
    assert_eq!(
        answerer.histories()[0].last().unwrap().content,
        reasoning_preamble("only thoughts")
    );
}

// ============================================================================
// ANSWER FAULTS
// ============================================================================

#[tokio::test]
async fn test_answer_fault_still_terminates() {
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("r"), content("")]),
        RecordingAnswerer::new(vec![answer("Hel"), fault("overloaded"), answer("never")]),
    );

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;

    assert_terminated(&frames);
    assert_eq!(answer_texts(&frames), vec!["Hel"]);
}

#[tokio::test]
async fn test_both_sources_fail() {
    let relay = DeepClaude::new(
        ScriptedReasoner::refusing(),
        RecordingAnswerer::new(vec![fault("down")]),
    );

    let frames = run(&relay, vec![ChatMessage::user("q")]).await;

    // Worst case: no chunks at all, just the sentinel
    assert_eq!(frames, vec![OutboundFrame::Done]);
}

// ============================================================================
// NON-STREAMING
// ============================================================================

#[tokio::test]
async fn test_complete_without_chunks_keeps_identity() {
    let relay = DeepClaude::new(
        ScriptedReasoner::refusing(),
        RecordingAnswerer::new(vec![fault("down")]),
    );

    let completion = timeout(LIMIT, relay.complete(request(vec![ChatMessage::user("q")])))
        .await
        .expect("completion did not finish");

    assert!(completion.id.starts_with("chatcmpl-"));
    assert!(completion.id.len() > "chatcmpl-".len());
    assert!(completion.created > 0);
    assert_eq!(completion.choices[0].message.content, "");
    assert!(completion.choices[0].message.reasoning_content.is_none());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_independent() {
    let relay = DeepClaude::new(Arc::new(SpellingReasoner), Arc::new(EchoAnswerer));
    let relay_a = relay.clone();
    let relay_b = relay.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move { run(&relay_a, vec![ChatMessage::user("alpha")]).await }),
        tokio::spawn(async move { run(&relay_b, vec![ChatMessage::user("bravo")]).await }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_terminated(&a);
    assert_terminated(&b);

    // Each stream carries only its own reasoning
    assert_eq!(reasoning_texts(&a).concat(), "alpha");
    assert_eq!(reasoning_texts(&b).concat(), "bravo");

    // and each answer saw only its own hand-off
    assert_eq!(answer_texts(&a).join(" "), reasoning_preamble("alpha"));
    assert_eq!(answer_texts(&b).join(" "), reasoning_preamble("bravo"));

    let ids_a: Vec<&str> = chunks(&a).iter().map(|c| c.id.as_str()).collect();
    let ids_b: Vec<&str> = chunks(&b).iter().map(|c| c.id.as_str()).collect();
    assert!(ids_a.iter().all(|id| *id == ids_a[0]));
    assert!(ids_b.iter().all(|id| *id == ids_b[0]));
    assert_ne!(ids_a[0], ids_b[0]);
}

// ============================================================================
// CANCELLATION
// ============================================================================

async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_dropping_stream_releases_reasoning_upstream() {
    let reasoner = HangingSource::new(vec![StreamEvent::Reasoning("thinking".into())]);
    let relay = DeepClaude::new(reasoner.clone(), RecordingAnswerer::new(vec![]));

    let mut stream = relay.stream(request(vec![ChatMessage::user("q")]));
    let first = timeout(LIMIT, stream.next()).await.unwrap();
    assert!(matches!(first, Some(OutboundFrame::Chunk(_))));
    assert!(!reasoner.is_released());

    drop(stream);

    assert!(
        wait_until(|| reasoner.is_released()).await,
        "reasoning upstream still held after the caller went away"
    );
}

#[tokio::test]
async fn test_dropping_stream_releases_answer_upstream() {
    let answerer = HangingSource::new(vec![StreamEvent::Answer("partial".into())]);
    let relay = DeepClaude::new(
        ScriptedReasoner::new(vec![reasoning("r"), content("")]),
        answerer.clone(),
    );

    let mut stream = relay.stream(request(vec![ChatMessage::user("q")]));
    // reasoning chunk, then the first answer chunk
    for _ in 0..2 {
        let frame = timeout(LIMIT, stream.next()).await.unwrap();
        assert!(matches!(frame, Some(OutboundFrame::Chunk(_))));
    }

    drop(stream);

    assert!(
        wait_until(|| answerer.is_released()).await,
        "answer upstream still held after the caller went away"
    );
}
