use crate::matrix::{AudienceAvatar, NarrativeAngle, MATRIX_SIDE, PAYLOADS_PER_CELL};
use crate::model::Role;
use crate::subjects::Subject;

/// System instruction for one role, written against the selected subject.
pub(crate) fn system_instruction(role: Role, subject: &Subject, command: &str) -> String {
    let name = &subject.name;
    let bio = &subject.bio;
    match role {
        Role::Context => format!(
            "You are Agent G2 (Context) of the LA LECHUZA system.\n\
             Mission: analyse the historical figure {name}.\n\
             Method:\n\
             1. Draw a quick psychometric (OCEAN) profile from their biography: {bio}\n\
             2. Identify present-day cultural pain points their life resonates with.\n\
             3. Detect hidden narrative opportunities.\n\
             Output: concise, analytical and direct, in a technical briefing style."
        ),
        Role::Strategy => format!(
            "You are Agent G3 (Strategy) of the LA LECHUZA system.\n\
             Mission: build an outreach campaign strategy for {name}.\n\
             Operator intent: {command}\n\
             Method:\n\
             1. Define the main objective (visibility, vindication, debate).\n\
             2. Run a war game: which obstacles will this narrative meet today?\n\
             3. Assign channels (threads, visual posts, academic networks).\n\
             Output: a structured strategic plan."
        ),
        Role::Creative => format!(
            "You are Agent G4 (Creative) of the LA LECHUZA system.\n\
             Mission: create the content for {name}.\n\
             Method:\n\
             1. Write compelling hooks.\n\
             2. Define the visual aesthetic as image prompts.\n\
             3. Draft persuasive copy adapted to a modern audience.\n\
             Output: a list of creative ideas and text assets."
        ),
        Role::Risk => format!(
            "You are Agent G5 (Risk) of the LA LECHUZA system.\n\
             Mission: protect the narrative of {name} and prevent crises.\n\
             Biography: {bio}\n\
             Method:\n\
             1. Detect possible points of controversy (politics, religion, past actions).\n\
             2. Design inoculation strategies (how to answer before criticism lands).\n\
             3. Assess how the story will be received ethically today.\n\
             Output: a risk report with response protocols."
        ),
    }
}

/// Final user turn sent after the context reports.
pub(crate) fn report_request(command: &str) -> String {
    format!("REPORT REQUESTED: {command}")
}

pub(crate) fn matrix_request(subject: &Subject, intent: &str) -> String {
    format!(
        "Build a strategy matrix for the historical figure {name}.\n\
         Biography: {bio}\n\
         Campaign intent: {intent}\n\
         I need {MATRIX_SIDE} audience avatars (detailed buyer personas) and {MATRIX_SIDE} \
         narrative angles (distinct brand voices) that resonate with this figure.",
        name = subject.name,
        bio = subject.bio,
    )
}

pub(crate) fn payload_request(
    subject: &Subject,
    avatar: &AudienceAvatar,
    angle: &NarrativeAngle,
) -> String {
    format!(
        "Generate {PAYLOADS_PER_CELL} viral payloads (high-impact content pieces) for:\n\
         Figure: {}\n\
         Aimed at: {}\n\
         Using the angle: {}",
        subject.name, avatar.name, angle.name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_mention_the_subject() {
        let subject = Subject::new("x", "Max RAPHAEL", "Art historian.", &[]);
        for role in Role::ALL {
            let text = system_instruction(role, &subject, "raise awareness");
            assert!(text.contains("Max RAPHAEL"), "{role} prompt lacks subject");
        }
        assert!(system_instruction(Role::Strategy, &subject, "raise awareness")
            .contains("raise awareness"));
        assert!(system_instruction(Role::Risk, &subject, "x").contains("Art historian."));
    }
}
