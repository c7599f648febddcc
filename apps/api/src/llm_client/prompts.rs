// Prompt construction for the on-device assistant.
// The profile is embedded verbatim as the only grounding text.

use std::fmt::Write;

use regex::Regex;

use crate::models::profile::Profile;

/// Label the prompt uses for the person asking.
pub const ASKER_LABEL: &str = "HR";

/// Stops the model from speaking for the asker, echoing the prompt scaffold
/// or turning the question around.
pub const STOP_TOKENS: &[&str] = &[
    "</s>",
    "\nHR:",
    "HR:",
    "Question from HR:",
    "What about you?",
    "How about you?",
    "Are you thinking",
    "Tell me about",
];

/// Answer rules appended after the grounding text.
const RULES: &str = "\
CRITICAL RULES:
1. ALWAYS respond in FIRST PERSON (use \"I\", \"my\", \"me\"). Never refer to yourself in the third person.
2. NEVER mention certifications, education, or courses - they are NOT in your information.
3. NEVER ask questions back (no \"What's your interest?\", \"How about you?\", etc.).
4. ONLY use the information above. If something isn't listed, say \"I don't have that specific information, but I'd be happy to share about my experience, skills, or projects!\"
5. Keep responses concise and relevant to the question asked.
6. Be friendly and professional, but stay focused on answering the question.";

/// System preamble: who to impersonate plus the full profile.
pub fn system_prompt(profile: &Profile) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are {name}. HR professionals are asking questions about you. Answer ONLY using the exact \
         information provided below. NEVER make up details, certifications, education, or experiences \
         not listed here.\n",
        name = profile.name
    );

    let _ = writeln!(out, "YOUR ACTUAL INFORMATION (USE ONLY THIS):");
    let _ = writeln!(out, "- Name: {}", profile.name);
    let _ = writeln!(out, "- Title: {}", profile.headline);
    let _ = writeln!(out, "- Location: {}", profile.location);
    let _ = writeln!(out, "- Email: {}", profile.email);
    let _ = writeln!(out, "- Phone: {}", profile.phone);
    let _ = writeln!(out, "- LinkedIn: {}", profile.linkedin);
    let _ = writeln!(out, "- GitHub: {}", profile.github);
    let _ = writeln!(out, "- Experience: {} years\n", profile.years_of_experience);

    let current = profile.current_role();
    let _ = writeln!(out, "CURRENT ROLE ({}):", current.period);
    let _ = writeln!(out, "- {} at {}, {}", current.role, current.company, current.location);
    for detail in &current.details {
        let _ = writeln!(out, "- {detail}");
    }

    if profile.experience.len() > 1 {
        let _ = writeln!(out, "\nPREVIOUS JOBS:");
        for (i, job) in profile.experience.iter().skip(1).enumerate() {
            let _ = writeln!(
                out,
                "{}. {} at {}, {} ({})",
                i + 1,
                job.role,
                job.company,
                job.location,
                job.period
            );
            for detail in &job.details {
                let _ = writeln!(out, "   - {detail}");
            }
        }
    }

    let _ = writeln!(out, "\nSKILLS (ONLY THESE):\n{}", profile.skills.join(", "));

    if !profile.projects.is_empty() {
        let _ = writeln!(out, "\nPROJECTS:");
        for project in &profile.projects {
            let _ = writeln!(
                out,
                "- {} ({}): {}",
                project.title,
                project.tech.join(", "),
                project.description
            );
        }
    }

    let _ = writeln!(out, "\nABOUT:\n{}\n", profile.about);
    out.push_str(RULES);
    out
}

/// Fixed greeting used instead of inference for "hi" / "hello" and friends.
pub fn canned_greeting(profile: &Profile) -> String {
    let current = profile.current_role();
    format!(
        "Hi! I'm {}, a {} with {} years of experience. I'm currently a {} at {} in {}. \
         I'm here 24/7 to answer your questions about my background, skills, or experience. \
         How can I help you today?",
        profile.name,
        profile.headline,
        profile.years_of_experience,
        current.role,
        current.company,
        current.location
    )
}

/// Full completion prompt for one question.
pub fn build_prompt(profile: &Profile, question: &str) -> String {
    format!(
        "{}\n\nQuestion from {ASKER_LABEL}: {}\n\nYour response:",
        system_prompt(profile),
        question.trim()
    )
}

/// Stop tokens for `profile`: the shared set plus the owner's own label.
pub fn stop_tokens(profile: &Profile) -> Vec<String> {
    let owner = profile.first_name();
    let mut tokens: Vec<String> = STOP_TOKENS.iter().map(|s| s.to_string()).collect();
    tokens.push(format!("\n{owner}:"));
    tokens.push(format!("{owner}:"));
    tokens
}

/// Removes leaked `HR:` / `<owner>:` labels at the start of any line.
pub fn strip_role_labels(text: &str, owner: &str) -> String {
    let pattern = format!(
        r"(?im)^[ \t]*(?:{}|{}):[ \t]*",
        regex::escape(ASKER_LABEL),
        regex::escape(owner)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text.trim(), "").trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile::builtin().unwrap()
    }

    #[test]
    fn test_system_prompt_embeds_profile() {
        let p = profile();
        let prompt = system_prompt(&p);
        assert!(prompt.starts_with(&format!("You are {}.", p.name)));
        assert!(prompt.contains(&p.email));
        for skill in &p.skills {
            assert!(prompt.contains(skill.as_str()));
        }
        for job in &p.experience {
            assert!(prompt.contains(&job.company));
        }
        assert!(prompt.contains("FIRST PERSON"));
    }

    #[test]
    fn test_build_prompt_ends_with_question_scaffold() {
        let prompt = build_prompt(&profile(), "  What do you do?  ");
        assert!(prompt.ends_with("Question from HR: What do you do?\n\nYour response:"));
    }

    #[test]
    fn test_canned_greeting_names_current_employer() {
        let p = profile();
        let greeting = canned_greeting(&p);
        assert!(greeting.starts_with(&format!("Hi! I'm {}", p.name)));
        assert!(greeting.contains(&p.current_role().company));
    }

    #[test]
    fn test_stop_tokens_include_owner_label() {
        let tokens = stop_tokens(&profile());
        assert!(tokens.iter().any(|t| t == "Dev:"));
        assert!(tokens.iter().any(|t| t == "HR:"));
    }

    #[test]
    fn test_strip_role_labels() {
        assert_eq!(strip_role_labels("Dev: I build apps.", "Dev"), "I build apps.");
        assert_eq!(
            strip_role_labels("hr: hello\nDEV:  I build apps.", "Dev"),
            "hello\nI build apps."
        );
        assert_eq!(
            strip_role_labels("I use React: it is great.", "Dev"),
            "I use React: it is great."
        );
    }
}
