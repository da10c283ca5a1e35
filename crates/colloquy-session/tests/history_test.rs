mod common;

use colloquy_llm::{Content, ReasoningEffort, ReasoningParams};
use colloquy_persist::{AssetStore, InMemoryConversationStore};
use colloquy_session::{GenerationOptions, PendingFile, SessionError};
use colloquy_types::{Conversation, EngineConfig, Message, Role};
use common::*;
use std::path::Path;

/// u1, a1, u2, a2; a1 came from a reasoning model and kept its thinking
fn seeded() -> (Harness, String, Vec<String>) {
    let conversation = Conversation::new(None).with_messages(vec![
        Message::user("first question"),
        Message::assistant("first answer", "o3-mini").with_thinking("pondering"),
        Message::user("second question"),
        Message::assistant("second answer", "model-b"),
    ]);
    let cid = conversation.id.clone();
    let ids = conversation.messages.iter().map(|m| m.id().to_string()).collect();

    let h = harness_with(
        EngineConfig::default().with_default_model(MODEL),
        InMemoryConversationStore::with_conversations([conversation]),
    );
    (h, cid, ids)
}

#[tokio::test]
async fn test_regenerate_unknown_message_changes_nothing() {
    let (h, cid, _) = seeded();
    h.session.load().await.unwrap();
    let before = h.session.conversation(&cid).unwrap();

    let result = h.session.regenerate(&cid, "missing", GenerationOptions::new()).await;

    assert!(matches!(result, Err(SessionError::MessageNotFound { .. })));
    assert_eq!(h.session.conversation(&cid).unwrap(), before);
    assert!(h.client.requests().is_empty());
}

#[tokio::test]
async fn test_regenerate_truncates_before_target() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();
    h.client.reply("better answer");

    h.session
        .regenerate(&cid, &ids[1], GenerationOptions::new())
        .await
        .unwrap();

    let conversation = h.session.conversation(&cid).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].id(), ids[0]);
    assert_eq!(conversation.messages[1].text(), "better answer");
    assert_ne!(conversation.messages[1].id(), ids[1]);

    // the request carries only the context before the target
    let request = h.client.last_request();
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].content(), &Content::text("first question"));
}

#[tokio::test]
async fn test_regenerate_inherits_model_and_reasoning() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();
    h.client.reply("again");

    h.session
        .regenerate(&cid, &ids[1], GenerationOptions::new())
        .await
        .unwrap();

    let request = h.client.last_request();
    assert_eq!(request.model, "o3-mini");
    assert_eq!(
        request.options.reasoning,
        Some(ReasoningParams::Effort(ReasoningEffort::High))
    );
}

#[tokio::test]
async fn test_regenerate_explicit_model_wins() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();
    h.client.reply("again");

    h.session
        .regenerate(&cid, &ids[3], GenerationOptions::new().model("o3-mini"))
        .await
        .unwrap();

    let request = h.client.last_request();
    assert_eq!(request.model, "o3-mini");
    assert!(request.options.reasoning.is_none());
}

#[tokio::test]
async fn test_regenerate_rejects_user_and_leading_messages() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();

    let wrong = h.session.regenerate(&cid, &ids[0], GenerationOptions::new()).await;
    assert!(matches!(
        wrong,
        Err(SessionError::WrongRole { expected: Role::Assistant, .. })
    ));

    let lonely = Conversation::new(None).with_messages(vec![Message::assistant("hi", MODEL)]);
    let lonely_id = lonely.id.clone();
    let target = lonely.messages[0].id().to_string();
    let h = harness_with(
        EngineConfig::default(),
        InMemoryConversationStore::with_conversations([lonely]),
    );
    h.session.load().await.unwrap();

    let result = h.session.regenerate(&lonely_id, &target, GenerationOptions::new()).await;
    assert!(matches!(result, Err(SessionError::NothingToRegenerate(_))));
    assert_eq!(h.session.conversation(&lonely_id).unwrap().messages.len(), 1);
}

#[tokio::test]
async fn test_resend_truncates_from_target() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();
    h.client.reply("new second answer");

    h.session
        .resend(&cid, &ids[2], GenerationOptions::new())
        .await
        .unwrap();

    let conversation = h.session.conversation(&cid).unwrap();
    let texts: Vec<String> = conversation.messages.iter().map(|m| m.text()).collect();
    assert_eq!(
        texts,
        vec!["first question", "first answer", "second question", "new second answer"]
    );
    assert_eq!(conversation.messages[0].id(), ids[0]);
    assert_eq!(conversation.messages[1].id(), ids[1]);
    assert_ne!(conversation.messages[2].id(), ids[2]);

    // inherited from the reply that followed the target
    assert_eq!(h.client.last_request().model, "model-b");
    assert_eq!(h.client.last_request().messages.len(), 3);
}

#[tokio::test]
async fn test_resend_rejects_assistant_target() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();

    let result = h.session.resend(&cid, &ids[1], GenerationOptions::new()).await;

    assert!(matches!(
        result,
        Err(SessionError::WrongRole { expected: Role::User, .. })
    ));
    assert_eq!(h.session.conversation(&cid).unwrap().messages.len(), 4);
    assert!(!h.session.is_generating(&cid));
}

#[tokio::test]
async fn test_resend_reuses_stored_attachment() {
    let h = harness();
    let cid = h.session.create_conversation(None);
    h.client.reply("a cat");
    h.client.reply("still a cat");

    let file = PendingFile::new("cat.png", "image/png", b"meow".to_vec());
    h.session
        .send(&cid, "what is this", MODEL, false, GenerationOptions::new(), vec![file])
        .await
        .unwrap();

    let first = h.session.conversation(&cid).unwrap();
    let original_path = first.messages[0].attachments()[0].path.clone();
    let user_id = first.messages[0].id().to_string();

    h.session
        .resend(&cid, &user_id, GenerationOptions::new())
        .await
        .unwrap();

    let conversation = h.session.conversation(&cid).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].text(), "what is this");
    assert_eq!(conversation.messages[0].attachments()[0].path, original_path);
    assert_eq!(h.assets.len(), 1);
    assert!(conversation.messages[0].content().has_attachments());
}

#[tokio::test]
async fn test_resend_skips_missing_attachment() {
    let h = harness();
    let cid = h.session.create_conversation(None);
    h.client.reply("a cat");
    h.client.reply("no image now");

    let file = PendingFile::new("cat.png", "image/png", b"meow".to_vec());
    h.session
        .send(&cid, "what is this", MODEL, false, GenerationOptions::new(), vec![file])
        .await
        .unwrap();

    let first = h.session.conversation(&cid).unwrap();
    let path = first.messages[0].attachments()[0].path.clone();
    let user_id = first.messages[0].id().to_string();
    h.assets.delete(&cid, Path::new(&path)).await.unwrap();

    h.session
        .resend(&cid, &user_id, GenerationOptions::new())
        .await
        .unwrap();

    let conversation = h.session.conversation(&cid).unwrap();
    assert!(conversation.messages[0].attachments().is_empty());
    assert_eq!(conversation.messages[0].content(), &Content::text("what is this"));
}

#[tokio::test]
async fn test_edit_user_message_resends() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();
    h.client.reply("answer to the edit");

    let outcome = h
        .session
        .edit(&cid, &ids[0], "changed question", GenerationOptions::new())
        .await
        .unwrap();
    assert!(outcome.is_some());

    let conversation = h.session.conversation(&cid).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].id(), ids[0]);
    assert_eq!(conversation.messages[0].text(), "changed question");
    assert!(conversation.messages[0].edited_at().is_some());
    assert_eq!(conversation.messages[1].text(), "answer to the edit");

    assert_eq!(h.client.last_request().model, "o3-mini");
}

#[tokio::test]
async fn test_edit_assistant_message_in_place() {
    let (h, cid, ids) = seeded();
    h.session.load().await.unwrap();

    let outcome = h
        .session
        .edit(&cid, &ids[3], "corrected answer", GenerationOptions::new())
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert!(h.client.requests().is_empty());

    let conversation = h.session.conversation(&cid).unwrap();
    assert_eq!(conversation.messages.len(), 4);
    assert_eq!(conversation.messages[3].text(), "corrected answer");
    assert!(conversation.messages[3].edited_at().is_some());
    assert!(h.session.is_dirty(&cid));
}

#[tokio::test]
async fn test_edit_keeps_attachment_metadata() {
    let h = harness();
    let cid = h.session.create_conversation(None);
    h.client.reply("first");
    h.client.reply("second");

    let file = PendingFile::new("notes.pdf", "application/pdf", b"%PDF".to_vec());
    h.session
        .send(&cid, "summarize", MODEL, false, GenerationOptions::new(), vec![file])
        .await
        .unwrap();
    let user_id = h.session.conversation(&cid).unwrap().messages[0].id().to_string();

    h.session
        .edit(&cid, &user_id, "summarize briefly", GenerationOptions::new())
        .await
        .unwrap();

    let conversation = h.session.conversation(&cid).unwrap();
    assert_eq!(conversation.messages[0].content(), &Content::text("summarize briefly"));
    assert_eq!(conversation.messages[0].attachments().len(), 1);
    assert_eq!(
        h.client.last_request().messages[0].content(),
        &Content::text("summarize briefly")
    );
}

#[tokio::test]
async fn test_delete_message_ignores_asset_failure() {
    let h = harness();
    let cid = h.session.create_conversation(None);
    h.client.reply("ok");

    let file = PendingFile::new("a.txt", "text/plain", b"abc".to_vec());
    h.session
        .send(&cid, "read this", MODEL, false, GenerationOptions::new(), vec![file])
        .await
        .unwrap();
    let user_id = h.session.conversation(&cid).unwrap().messages[0].id().to_string();

    h.assets.fail_deletes(true);
    h.session.delete(&cid, &user_id).await.unwrap();

    let conversation = h.session.conversation(&cid).unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert!(conversation.messages[0].is_assistant());
    assert!(h.session.is_dirty(&cid));
}

#[tokio::test]
async fn test_delete_removes_asset() {
    let h = harness();
    let cid = h.session.create_conversation(None);
    h.client.reply("ok");

    let file = PendingFile::new("a.txt", "text/plain", b"abc".to_vec());
    h.session
        .send(&cid, "read this", MODEL, false, GenerationOptions::new(), vec![file])
        .await
        .unwrap();
    let user_id = h.session.conversation(&cid).unwrap().messages[0].id().to_string();

    h.session.delete(&cid, &user_id).await.unwrap();

    assert!(h.assets.is_empty());
}

#[tokio::test]
async fn test_delete_live_message_rejected() {
    let h = harness();
    let cid = h.session.create_conversation(None);
    let tx = h.client.live();
    let mut events = h.session.subscribe();

    let session = h.session.clone();
    let id = cid.clone();
    let task = tokio::spawn(async move {
        session.send(&id, "hi", MODEL, false, GenerationOptions::new(), vec![]).await
    });
    tx.send(content("streaming")).unwrap();
    wait_for_content(&mut events).await;

    let live_id = h.session.conversation(&cid).unwrap().messages[1].id().to_string();
    let result = h.session.delete(&cid, &live_id).await;
    assert!(matches!(result, Err(SessionError::MessageStreaming(_))));

    let edit = h
        .session
        .edit(&cid, &live_id, "nope", GenerationOptions::new())
        .await;
    assert!(matches!(edit, Err(SessionError::MessageStreaming(_))));

    drop(tx);
    task.await.unwrap().unwrap();
    assert_eq!(h.session.conversation(&cid).unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_delete_unknown_message() {
    let (h, cid, _) = seeded();
    h.session.load().await.unwrap();

    let result = h.session.delete(&cid, "missing").await;

    assert!(matches!(result, Err(SessionError::MessageNotFound { .. })));
    assert_eq!(h.session.conversation(&cid).unwrap().messages.len(), 4);
}
