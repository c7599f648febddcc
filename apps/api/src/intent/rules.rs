//! The rule table. Order here is dispatch priority; the fallback rule is last.
//!
//! Responders read every profile value they narrate from the `Profile`, so
//! editing the profile data never leaves the chat out of date.

use regex::Regex;

use crate::intent::Intent;
use crate::models::profile::Profile;

/// Produces the answer for a matched rule. `matched` is the text the trigger
/// matched (the named skill for the technology rule).
pub type Responder = fn(&Profile, &str) -> String;

/// How many skills the skills answer lists before summarizing the rest.
pub const SKILLS_PREVIEW_LIMIT: usize = 10;

const GREETING_PATTERN: &str =
    r"^(?:hi|hello|hey|greetings|good morning|good afternoon|good evening)\b";
const INTRODUCTION_PATTERN: &str =
    r"\b(?:who is|who are you|tell me about|introduce|about yourself|background|overview)";
const EXPERIENCE_PATTERN: &str =
    r"\b(?:experience|work|job|career|employment|current role|where do you work|company)";
const SKILLS_PATTERN: &str =
    r"\b(?:skill|technology|technologies|tech stack|what can|proficient|expertise|knows)";
const PROJECTS_PATTERN: &str = r"\b(?:project|built|developed|portfolio|github|work sample)";
const EDUCATION_PATTERN: &str =
    r"\b(?:education|degree|university|college|qualification|studied)";
const CONTACT_PATTERN: &str =
    r"\b(?:contact|email|e-mail|phone|reach|get in touch|linkedin|github)";
const LOCATION_PATTERN: &str = r"\b(?:location|where|based|city|address|live)";
const AVAILABILITY_PATTERN: &str =
    r"\b(?:available|availability|open to|looking for|hiring|opportunit|job|position|role)";
const YEARS_PATTERN: &str = r"\b(?:how long|years|experience|tenure|duration)";

pub enum Trigger {
    Pattern(Regex),
    Always,
}

impl Trigger {
    /// Returns the matched text, or `None` when the trigger does not fire.
    /// A capture group named `term` narrows the match to that group.
    pub fn test<'a>(&self, text: &'a str) -> Option<&'a str> {
        match self {
            Trigger::Always => Some(text),
            Trigger::Pattern(re) => {
                let caps = re.captures(text)?;
                caps.name("term")
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str())
            }
        }
    }
}

pub struct IntentRule {
    pub intent: Intent,
    pub trigger: Trigger,
    pub respond: Responder,
}

impl IntentRule {
    fn pattern(intent: Intent, pattern: &str, respond: Responder) -> Result<Self, regex::Error> {
        Ok(Self {
            intent,
            trigger: Trigger::Pattern(Regex::new(pattern)?),
            respond,
        })
    }
}

/// Builds the ordered rule table for `profile`.
pub fn default_rules(profile: &Profile) -> Result<Vec<IntentRule>, regex::Error> {
    let mut rules = vec![
        IntentRule::pattern(Intent::Greeting, GREETING_PATTERN, greeting)?,
        IntentRule::pattern(Intent::Introduction, INTRODUCTION_PATTERN, introduction)?,
        IntentRule::pattern(Intent::Experience, EXPERIENCE_PATTERN, experience)?,
        IntentRule::pattern(Intent::Skills, SKILLS_PATTERN, skills)?,
        IntentRule::pattern(Intent::Projects, PROJECTS_PATTERN, projects)?,
        IntentRule::pattern(Intent::Education, EDUCATION_PATTERN, education)?,
        IntentRule::pattern(Intent::Contact, CONTACT_PATTERN, contact)?,
        IntentRule::pattern(Intent::Location, LOCATION_PATTERN, location)?,
        IntentRule::pattern(Intent::Availability, AVAILABILITY_PATTERN, availability)?,
        IntentRule::pattern(Intent::YearsOfExperience, YEARS_PATTERN, years_of_experience)?,
    ];

    if let Some(pattern) = technology_pattern(&profile.skills) {
        rules.push(IntentRule::pattern(Intent::Technology, &pattern, technology)?);
    }

    rules.push(IntentRule {
        intent: Intent::Fallback,
        trigger: Trigger::Always,
        respond: fallback,
    });

    Ok(rules)
}

/// Folds a skill or a mention of it to a comparable key: lower-case with an
/// optional `.js` suffix removed, so "Express" and "express.js" agree.
fn skill_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".js") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

/// Alternation over the profile's skills, longest first so that
/// "react native" wins over "react".
fn technology_pattern(skills: &[String]) -> Option<String> {
    let mut keys: Vec<String> = skills
        .iter()
        .map(|s| skill_key(s))
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return None;
    }
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    keys.dedup();

    let alternation = keys
        .iter()
        .map(|k| format!(r"{}(?:\.js)?", regex::escape(k)))
        .collect::<Vec<_>>()
        .join("|");

    Some(format!(
        r"(?:^|[^a-z0-9])(?P<term>{alternation})(?:$|[^a-z0-9])"
    ))
}

/// Maps a matched mention back to the profile's own spelling of the skill.
fn canonical_skill<'a>(profile: &'a Profile, mention: &'a str) -> &'a str {
    let key = skill_key(mention);
    profile
        .skills
        .iter()
        .find(|s| skill_key(s) == key)
        .map(String::as_str)
        .unwrap_or(mention)
}

/// "A", "A and B", "A, B, and C".
fn join_list(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => one.to_string(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

fn greeting(p: &Profile, _: &str) -> String {
    format!(
        "Hi! Great to meet you! I'm {}, a {} with {} years of experience. \
         I'm here 24/7 to answer any questions about my background, experience, skills, or projects. \
         What would you like to know?",
        p.name, p.headline, p.years_of_experience
    )
}

fn introduction(p: &Profile, _: &str) -> String {
    format!(
        "I'm {}, a {} based in {}. {}",
        p.name, p.headline, p.location, p.about
    )
}

fn experience(p: &Profile, _: &str) -> String {
    let current = p.current_role();
    let mut out = format!(
        "I'm currently working as a {} at {} in {} ({}).",
        current.role, current.company, current.location, current.period
    );

    if !current.details.is_empty() {
        out.push_str(" My key responsibilities include:\n");
        for detail in current.details.iter().take(3) {
            out.push_str("\n• ");
            out.push_str(detail);
        }
    }

    let previous = p.previous_employers();
    if !previous.is_empty() {
        out.push_str(&format!("\n\nPreviously, I worked at {}.", join_list(&previous)));
    }
    out
}

fn skills(p: &Profile, _: &str) -> String {
    let preview = p.skills_preview(SKILLS_PREVIEW_LIMIT);
    let mut out = format!(
        "I'm skilled in a range of technologies, including:\n\n{}",
        preview.join(", ")
    );
    let remaining = p.skills.len().saturating_sub(preview.len());
    if remaining > 0 {
        out.push_str(&format!("\n\n...and {remaining} more."));
    }
    out
}

fn projects(p: &Profile, _: &str) -> String {
    if p.projects.is_empty() {
        return format!(
            "I don't have projects listed here yet, but you can find my work on GitHub: {}",
            p.github
        );
    }

    let list = p
        .projects
        .iter()
        .map(|project| {
            format!(
                "• {} - {} (Tech: {})",
                project.title,
                project.description,
                project.tech.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Here are some projects I've worked on:\n\n{list}\n\nYou can find more of my work on GitHub: {}",
        p.github
    )
}

fn education(p: &Profile, _: &str) -> String {
    format!(
        "I don't have specific education details to share here, but I have {} years of \
         professional experience as a {}.",
        p.years_of_experience, p.headline
    )
}

fn contact(p: &Profile, _: &str) -> String {
    format!(
        "You can reach me through:\n\n📧 Email: {}\n📱 Phone: {}\n💼 LinkedIn: {}\n💻 GitHub: {}\n\n\
         Feel free to connect for opportunities or collaborations!",
        p.email, p.phone, p.linkedin, p.github
    )
}

fn location(p: &Profile, _: &str) -> String {
    format!(
        "I'm currently based in {}. I'm open to remote opportunities and willing to relocate \
         for the right role.",
        p.location
    )
}

fn availability(p: &Profile, _: &str) -> String {
    let current = p.current_role();
    format!(
        "I'm currently working as a {} at {}, but I'm always open to discussing exciting \
         opportunities. Feel free to reach out via email ({}) or LinkedIn!",
        current.role, current.company, p.email
    )
}

fn years_of_experience(p: &Profile, _: &str) -> String {
    let current = p.current_role();
    format!(
        "I have {} years of professional experience as a {}, most recently as a {} at {}.",
        p.years_of_experience, p.headline, current.role, current.company
    )
}

fn technology(p: &Profile, mention: &str) -> String {
    let skill = canonical_skill(p, mention);
    let key = skill_key(skill);

    let used_in: Vec<&str> = p
        .projects
        .iter()
        .filter(|project| project.tech.iter().any(|t| skill_key(t) == key))
        .map(|project| project.title.as_str())
        .collect();

    let mut out = format!("Yes, I have hands-on experience with {skill}.");
    if !used_in.is_empty() {
        out.push_str(&format!(" I've used it in {}.", join_list(&used_in)));
    }
    out.push_str(&format!(" {skill} is one of my core skills."));
    out
}

fn fallback(p: &Profile, _: &str) -> String {
    format!(
        "I'm {}, and I can answer questions about:\n\n\
         • My professional experience and current role\n\
         • My technical skills and expertise\n\
         • Projects I've worked on\n\
         • How to contact me\n\
         • My background and career journey\n\n\
         Could you rephrase your question?",
        p.name
    )
}
