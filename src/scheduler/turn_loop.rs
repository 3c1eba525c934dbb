//! The per-symposium scheduler loop.
//!
//! Each iteration re-reads the conversation, picks a speaker, runs one turn and
//! then waits for the interval or a wake signal. Cancellation is observed at
//! the top of every iteration, during every wait, and while a generation is in
//! flight.

use std::sync::Arc;
use std::time::Duration;

use crate::compose::{compose_turn, context_tail, persist_response, sorted_context};
use crate::domain::{BotState, ChatMessage, SymposiumConfig, SymposiumEvent, User};
use crate::error::{Result, SymposiumError};
use crate::events::EventSink;
use crate::id::now_secs;
use crate::llm::{GenerationRequest, Generator, accumulate};
use crate::store::{ConversationStore, UserStore, blocking};

use super::history::word_count;
use super::runtime::SymposiumRuntime;
use super::select::{Selection, TurnSelector};
use super::settings::SchedulerSettings;
use super::wake::{WakeReason, sleep_or_cancel};

/// Error text longer than this is truncated in status events
const STATUS_ERROR_MAX_CHARS: usize = 100;

/// Everything a loop task needs
pub(crate) struct LoopContext {
    pub runtime: Arc<SymposiumRuntime>,
    pub store: Arc<dyn ConversationStore>,
    pub users: Arc<dyn UserStore>,
    pub generator: Arc<dyn Generator>,
    pub sink: Arc<dyn EventSink>,
    pub settings: SchedulerSettings,
}

/// Why a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// Conversation deleted or archived; the registry should clean up
    ConversationGone,
}

enum Step {
    /// Proceed to the end-of-iteration wait
    Wait,
    /// Start the next iteration immediately
    Next,
    Exit(LoopExit),
}

/// Outcome of a generation raced against cancellation
enum TurnResult {
    Spoke(Option<ChatMessage>),
    Failed(SymposiumError),
    Cancelled,
}

pub(crate) async fn run_symposium(ctx: LoopContext) -> LoopExit {
    let id = ctx.runtime.conversation_id().to_string();
    let cancel = ctx.runtime.cancel_token().clone();
    let mut interval = ctx.settings.scaled(Duration::from_secs(
        ctx.settings.default_interval_secs.max(ctx.settings.min_interval_secs),
    ));

    tracing::info!(conversation_id = %id, "Symposium loop started");

    let exit = loop {
        if cancel.is_cancelled() {
            break LoopExit::Cancelled;
        }

        let step = match iteration(&ctx, &mut interval).await {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(conversation_id = %id, error = %e, "Symposium iteration failed");
                Step::Wait
            }
        };

        match step {
            Step::Exit(exit) => break exit,
            Step::Next => continue,
            Step::Wait => {
                if ctx.runtime.wake().wait(interval, &cancel).await == WakeReason::Cancelled {
                    break LoopExit::Cancelled;
                }
            }
        }
    };

    tracing::info!(conversation_id = %id, exit = ?exit, "Symposium loop ended");
    exit
}

async fn iteration(ctx: &LoopContext, interval: &mut Duration) -> Result<Step> {
    let id = ctx.runtime.conversation_id().to_string();
    let cancel = ctx.runtime.cancel_token();

    let conv_id = id.clone();
    let conversation = match blocking(&ctx.store, move |s| s.get_conversation(&conv_id)).await? {
        Some(conv) if !conv.archived => conv,
        Some(_) => {
            tracing::info!(conversation_id = %id, "Conversation archived, stopping symposium");
            return Ok(Step::Exit(LoopExit::ConversationGone));
        }
        None => {
            tracing::info!(conversation_id = %id, "Conversation not found, stopping symposium");
            return Ok(Step::Exit(LoopExit::ConversationGone));
        }
    };

    let config = SymposiumConfig::from_value(&conversation.config, &ctx.settings);

    if config.paused {
        tracing::debug!(conversation_id = %id, "Symposium paused");
        let wait = ctx.settings.scaled(ctx.settings.paused_wait);
        return Ok(match ctx.runtime.wake().wait(wait, cancel).await {
            WakeReason::Cancelled => Step::Exit(LoopExit::Cancelled),
            _ => Step::Next,
        });
    }

    *interval = ctx.settings.scaled(config.interval());

    if config.models.is_empty() {
        tracing::warn!(conversation_id = %id, "Symposium has no participants");
        return Ok(sleep_step(*interval, ctx).await);
    }

    let recent = sorted_context(&conversation, now_secs(), &ctx.settings);
    let forced = ctx.runtime.take_override();

    let state_of = |m: &str| ctx.runtime.bot_state(m);
    let circuit_open = |m: &str| ctx.runtime.circuit_open(m);
    let selection = TurnSelector {
        models: &config.models,
        last_message: recent.last(),
        override_model: forced.as_deref(),
        state_of: &state_of,
        circuit_open: &circuit_open,
    }
    .select();

    let model = match selection {
        Selection::Speak { model, tagged, source } => {
            tracing::debug!(conversation_id = %id, model = %model, tagged, source = ?source, "Selected speaker");
            model
        }
        Selection::AllCircuitsOpen => {
            tracing::warn!(conversation_id = %id, "All participants have open circuits, backing off");
            return Ok(sleep_step(interval.saturating_mul(2), ctx).await);
        }
        Selection::NoActiveSpeaker => {
            tracing::debug!(conversation_id = %id, "No active participant, waiting");
            return Ok(Step::Wait);
        }
    };

    let context = context_tail(&recent, config.context_limit);
    let whisper = ctx.runtime.take_whisper(&model);
    let messages = compose_turn(&config, &model, whisper.as_deref(), context);
    let request = GenerationRequest::new(&id, &model, messages);

    let user_id = conversation.user_id.clone();
    let user = blocking(&ctx.users, move |s| s.get_user(&user_id))
        .await?
        .ok_or_else(|| SymposiumError::NotFound(format!("user {}", conversation.user_id)))?;

    Ok(run_turn(ctx, &model, request, &user, context.last()).await)
}

async fn sleep_step(duration: Duration, ctx: &LoopContext) -> Step {
    if sleep_or_cancel(duration, ctx.runtime.cancel_token()).await {
        Step::Next
    } else {
        Step::Exit(LoopExit::Cancelled)
    }
}

fn set_state(ctx: &LoopContext, model: &str, state: BotState) {
    ctx.runtime.set_bot_state(model, state);
    ctx.sink
        .emit(SymposiumEvent::bot_state(ctx.runtime.conversation_id(), model, state));
}

/// Generate, accumulate and persist one reply.
async fn speak(
    ctx: &LoopContext,
    model: &str,
    request: &GenerationRequest,
    user: &User,
    parent: Option<&ChatMessage>,
) -> Result<Option<ChatMessage>> {
    let output = ctx.generator.generate(request, user).await?;
    let content = accumulate(output).await?;

    if content.is_empty() {
        tracing::debug!(model = %model, "Empty response, nothing persisted");
        return Ok(None);
    }

    let message = persist_response(&ctx.store, ctx.runtime.conversation_id(), model, &content, parent).await?;
    Ok(Some(message))
}

async fn run_turn(
    ctx: &LoopContext,
    model: &str,
    request: GenerationRequest,
    user: &User,
    parent: Option<&ChatMessage>,
) -> Step {
    let id = ctx.runtime.conversation_id().to_string();
    let cancel = ctx.runtime.cancel_token();

    ctx.runtime.set_current_speaker(Some(model));
    set_state(ctx, model, BotState::Speaking);
    ctx.sink.emit(SymposiumEvent::generating(&id, model));

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => TurnResult::Cancelled,
        r = speak(ctx, model, &request, user, parent) => match r {
            Ok(message) => TurnResult::Spoke(message),
            Err(e) => TurnResult::Failed(e),
        },
    };

    match result {
        TurnResult::Cancelled => {
            tracing::debug!(conversation_id = %id, model = %model, "Turn cancelled");
            set_state(ctx, model, BotState::Active);
            ctx.runtime.set_current_speaker(None);
            Step::Exit(LoopExit::Cancelled)
        }
        TurnResult::Spoke(message) => {
            if let Some(message) = message {
                let words = word_count(&message.content);
                ctx.runtime.record_speaking(model, words);
                ctx.runtime.record_success(model);
                tracing::info!(conversation_id = %id, model = %model, words, "Participant spoke");
                ctx.sink.emit(SymposiumEvent::message(&id, message));
            }
            set_state(ctx, model, BotState::Active);
            ctx.runtime.set_current_speaker(None);
            ctx.sink.emit(SymposiumEvent::idle(&id, model));
            Step::Wait
        }
        TurnResult::Failed(e) => {
            let failures = ctx.runtime.record_failure(model);
            let circuit_open = ctx.runtime.circuit_opens_at(failures);
            tracing::warn!(
                conversation_id = %id,
                model = %model,
                failures,
                error = %e,
                "Generation failed"
            );

            set_state(ctx, model, BotState::Active);
            ctx.runtime.set_current_speaker(None);
            ctx.sink.emit(SymposiumEvent::failed(
                &id,
                model,
                &failure_status(&e, failures, circuit_open),
                circuit_open,
            ));

            sleep_step(ctx.settings.scaled(ctx.settings.error_backoff), ctx).await
        }
    }
}

/// Status text for a failed turn
fn failure_status(error: &SymposiumError, failures: u32, circuit_open: bool) -> String {
    if circuit_open {
        return format!("Circuit breaker: {} consecutive errors", failures);
    }
    let text = match error {
        SymposiumError::Generation(message) => message.clone(),
        other => other.to_string(),
    };
    text.chars().take(STATUS_ERROR_MAX_CHARS).collect()
}
