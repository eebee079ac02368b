//! Step 1: client identity framing

use super::IdentityFraming;
use crate::core_types::{ConversionRequest, MessageContent, Role, SystemBlock, SystemPrompt};
use crate::logging::log_debug;

/// System text the upstream expects from the first-party client.
pub const FIRST_PARTY_IDENTITY: &str =
    "You are Claude Code, Anthropic's official CLI for Claude.";

/// Whether the system content already opens with the first-party identity.
pub fn identifies_first_party(system: &[SystemBlock]) -> bool {
    system
        .first()
        .is_some_and(|block| block.text.trim_start().starts_with(FIRST_PARTY_IDENTITY))
}

/// Apply identity framing in place.
///
/// Returns `true` when the caller is not the first-party client, in which case
/// its response must be translated to the OpenAI protocol. System-role turns
/// are moved into the system field in both policies because the upstream
/// rejects them inside `messages`.
pub fn apply(request: &mut ConversionRequest, framing: IdentityFraming) -> bool {
    let original = request.system_blocks();
    if identifies_first_party(&original) {
        return false;
    }

    let mut system = Vec::with_capacity(original.len() + 1);
    if framing == IdentityFraming::Masquerade {
        system.push(SystemBlock::text(FIRST_PARTY_IDENTITY));
    }
    system.extend(original);

    let before = request.messages.len();
    let mut stripped = Vec::new();
    request.messages.retain(|turn| {
        if turn.role == Role::System {
            stripped.push(turn.content.clone());
            false
        } else {
            true
        }
    });
    system.extend(
        stripped
            .iter()
            .map(MessageContent::plain_text)
            .filter(|text| !text.is_empty())
            .map(SystemBlock::text),
    );

    log_debug!(
        repair_step = "identity_framing",
        framing = ?framing,
        stripped_system_turns = before - request.messages.len(),
        system_blocks = system.len(),
        "Framed request as first-party client"
    );

    request.system = if system.is_empty() {
        None
    } else {
        Some(SystemPrompt::Blocks(system))
    };
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Turn;

    fn request_with_system(system: Option<SystemPrompt>) -> ConversionRequest {
        let mut request = ConversionRequest::new(
            "claude-sonnet-4",
            vec![
                Turn::new(
                    Role::System,
                    MessageContent::Text("Answer in French.".to_string()),
                ),
                Turn::user("hello"),
            ],
        );
        request.system = system;
        request
    }

    #[test]
    fn test_masquerade_prepends_identity_and_keeps_caller_system() {
        // Arrange
        let mut request = request_with_system(Some(SystemPrompt::Text("You are a helper.".into())));

        // Act
        let needs_translation = apply(&mut request, IdentityFraming::Masquerade);

        // Assert
        assert!(needs_translation);
        let texts: Vec<String> = request.system_blocks().into_iter().map(|b| b.text).collect();
        assert_eq!(
            texts,
            vec![FIRST_PARTY_IDENTITY, "You are a helper.", "Answer in French."],
            "Identity first, then caller system, then stripped system turns"
        );
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[test]
    fn test_first_party_caller_is_untouched() {
        let mut request = ConversionRequest::new("claude-sonnet-4", vec![Turn::user("hi")]);
        request.system = Some(SystemPrompt::Blocks(vec![
            SystemBlock::text(FIRST_PARTY_IDENTITY),
            SystemBlock::text("project rules"),
        ]));
        let before = request.clone();

        let needs_translation = apply(&mut request, IdentityFraming::Masquerade);

        assert!(!needs_translation);
        assert_eq!(request, before);
    }

    #[test]
    fn test_preserve_still_flags_translation_without_identity() {
        let mut request = request_with_system(None);

        let needs_translation = apply(&mut request, IdentityFraming::Preserve);

        assert!(needs_translation);
        assert!(!identifies_first_party(&request.system_blocks()));
        assert!(request.messages.iter().all(|t| t.role != Role::System));
    }

    #[test]
    fn test_framing_twice_does_not_duplicate_identity() {
        let mut request = request_with_system(None);

        apply(&mut request, IdentityFraming::Masquerade);
        let once = request.clone();
        apply(&mut request, IdentityFraming::Masquerade);

        assert_eq!(request, once);
    }
}
