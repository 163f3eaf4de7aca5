// change-engine-rs/src/prompts.rs
// Prompt templates for drafting, impact narration and task breakdown

use itsm_client::ChangeRequest;
use kb_retriever::ScoredDocument;

pub(crate) const ASSISTANT_ROLE: &str =
    "You are an IT change management assistant for an enterprise ITSM platform.";

const DETAIL_SUFFIX: &str = ". The steps should be details and must include applicable CLI commands, steps for UI navigation, APIs etc. No human interaction please.";

/// Ask the model to turn form fields into a change-creation prompt
pub(crate) fn change_brief(title: &str, purpose: &str, config_items: &str, os_info: &str) -> String {
    let mut prompt = String::from(
        "Please read the following details those are submitted by user for raising an IT change request-\n\n",
    );
    let mut field = |label: &str, value: &str| {
        if !value.trim().is_empty() {
            prompt.push_str(&format!("{} - {}\n\n", label, value.trim()));
        }
    };
    field("Change title", title);
    field("Change purpose", purpose);
    field("Configuration items", config_items);
    field("Operating system of configuration items", os_info);

    prompt.push_str(
        "Assume that you are a GenAI prompt engineer. With above data collected, form a prompt to create a change request. It should be primarily understood by LLM. Kindly exclude any justifications before or after prompt.",
    );
    prompt
}

/// Generated brief with quotes removed and the detail instruction appended
pub(crate) fn finish_brief(generated: &str) -> String {
    let cleaned: String = generated.chars().filter(|c| *c != '"' && *c != '\'').collect();
    format!("{}{}", cleaned.trim(), DETAIL_SUFFIX)
}

/// Requirement text plus any historical changes worth referencing
pub(crate) fn refined_requirement(brief: &str, history: &[ScoredDocument]) -> String {
    let mut prompt = String::from(
        "Please find below the requirement drafted by user - \n\n--------------------------------\n",
    );
    prompt.push_str(brief);
    prompt.push_str("\n---------------------------------\n");

    if !history.is_empty() {
        prompt.push_str("\nBelow are historical change requests for your reference those were raised for same or similar requirement - \n");
        for doc in history {
            let source = doc.document.source().unwrap_or("Historical change");
            prompt.push_str(&format!("{}\n{}\n\n", source, doc.document.content));
        }
        prompt.push_str("\n---------------------------------\n");
    }
    prompt
}

pub(crate) fn change_document_request(requirement: &str) -> String {
    format!(
        "{}\n\nWith this background, create a JSON document for change request with below keys - \n\
         short_description\ndescription\nimplementation_plan\nbackout_plan\ntest_plan\nchg_model: normal or emergency\n\
         Please ensure that the value corresponding to each key is a string. In a string, new point should start on new line. \
         Examples can have different IPs/names. But document should not influence of those specifics. \
         Please feel free to add missing steps and elaboration.",
        requirement
    )
}

pub(crate) fn service_map_impact(explanations: &[String], short_description: &str, description: &str) -> String {
    format!(
        "Below are the explanations of service maps associated to various configuration items -\n\n{}\n\
         Change activity is planned on these CIs. Please list out the potential impact of below change activity on other components in service map - \n\
         Change activity - {} - {}\n\n\
         Impact should be in terms of any service disruption that can happen when change activity is ongoing on overall architecture. \
         The impact analysis shouldn't just focus on 1 component, rather it's consequences on other connected components too. \
         If applicable, also include challenges that end user can face while accessing the application or services. \
         Explain any disruption or unavailability through logical example. It is must to justify why and how the impact happens.",
        explanations.join("\n\n"),
        short_description,
        description
    )
}

pub(crate) fn diagram_impact(short_description: &str, description: &str) -> String {
    format!(
        "Please analyze the attached image, which is likely related to architecture of environment/platform/tool etc.\n\n\
         Analysis method -\n\
         1. Check if the image has title.\n\
         2. Capture all the text information on the image to get right context of the image.\n\
         3. Try relating drawings around the text.\n\
         4. Check if there are multiple entities in the image which establish some relationship.\n\n\
         Post analysis, list out the potential impact of below change activity on other components of the architecture - \n\
         Change activity - {} - {}\n\n\
         Impact should be in terms of any service disruption that can happen when change activity is ongoing. \
         Include specific details like names or IPs of impacted components if available. \
         Include challenges that end user can face while accessing the application or services if applicable. \
         Explain any disruption or unavailability through logical example. It is must to justify why and how the impact happens.",
        short_description, description
    )
}

/// Retrieval query built from a change's three plans
pub(crate) fn similar_change_query(change: &ChangeRequest) -> String {
    format!(
        "Give me documents with change request similar to the below change request - \n\
         Implementation Plan : \n{}\nBackout Plan - \n{}\nTest Plan - \n{}\n\
         Find the most appropriate article for the above change request given ",
        change.implementation_plan, change.backout_plan, change.test_plan
    )
}

pub(crate) fn task_breakdown(change: &ChangeRequest, historical: &str) -> String {
    let history = if historical.trim().is_empty() {
        "No similar historical change request was found."
    } else {
        historical
    };

    format!(
        "Split the implementation of the current change request into change tasks.\n\n\
         Current change request -\n\
         Number: {}\nShort Description: {}\nDescription: {}\nAssignment Group: {}\n\
         Implementation Plan:\n{}\nBackout Plan:\n{}\nTest Plan:\n{}\n\n\
         Similar historical change requests and their change tasks -\n{}\n\n\
         Create one change task per distinct unit of work in the implementation plan, in execution order. \
         Use the historical change tasks to choose assignment groups and granularity. \
         Return only JSON objects, one per task, each with exactly the keys \
         short_description, description and assignment_group, all strings. \
         Put the JSON inside a single ``` code block and add nothing else.",
        change.number,
        change.short_description,
        change.description,
        change.assignment_group,
        change.implementation_plan,
        change.backout_plan,
        change.test_plan,
        history
    )
}

pub(crate) const KB_AUTHOR_ROLE: &str = "You are a technical SME who likes to create a knowledge article that consists of step by step solution with all relevant commands and examples for elaboration.";

pub(crate) const KB_SUMMARY_ROLE: &str = "Summarize the knowledge you go through in a generic fashion without including sensitive data. \
For the given issue, represent the issue summary, diagnosis and resolution suggestions professionally. \
I need strictly 3 things and no intro and conclusion.";

/// Numbered article bodies followed by the question they should answer
pub(crate) fn kb_summary_request(articles: &[(String, String)], query: &str) -> String {
    let mut listing = String::new();
    for (position, (number, content)) in articles.iter().enumerate() {
        listing.push_str(&format!(
            "{}. Article number - {}\nArticle summary - {}\n{}\n",
            position + 1,
            number,
            content,
            "-".repeat(93)
        ));
    }

    format!(
        "Consider a following content delimited by 3 back ticks - \n\n```\n{}\n```\n\n\
         The content is a collection of articles. Go through all articles and form a sequence of steps to resolve the issue. \
         Make sure to include a reference of knowledge article number in brackets.\n\n\
         It should be to the point and mainly should include commands and 1 line elaboration per command.\n\
         The response should be in context to the following question delimited by 3 back ticks - ```{}```\n\
         You can ignore some steps if they are not relevant to direct resolution of the issue.",
        listing.trim(),
        query
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_retriever::Document;

    #[test]
    fn test_change_brief_skips_blank_fields() {
        let prompt = change_brief("Patch kernel", "", " ", "RHEL 8");
        assert!(prompt.contains("Change title - Patch kernel\n\n"));
        assert!(!prompt.contains("Change purpose"));
        assert!(!prompt.contains("Configuration items"));
        assert!(prompt.contains("Operating system of configuration items - RHEL 8"));
    }

    #[test]
    fn test_finish_brief_removes_quotes() {
        assert_eq!(
            finish_brief(" Create a \"normal\" change 'now' "),
            format!("Create a normal change now{}", DETAIL_SUFFIX)
        );
    }

    #[test]
    fn test_refined_requirement_includes_history() {
        let history = vec![ScoredDocument {
            document: Document::new("old plan").with_source("CHG0030001"),
            score: 0.8,
        }];
        let prompt = refined_requirement("brief", &history);
        assert!(prompt.contains("CHG0030001\nold plan"));
        assert!(!refined_requirement("brief", &[]).contains("historical"));
    }

    #[test]
    fn test_kb_summary_request_numbers_articles() {
        let articles = vec![
            ("KB0010001".to_string(), "restart nginx".to_string()),
            ("KB0010002".to_string(), "rotate logs".to_string()),
        ];
        let prompt = kb_summary_request(&articles, "nginx returns 502");
        assert!(prompt.contains("1. Article number - KB0010001\nArticle summary - restart nginx"));
        assert!(prompt.contains("2. Article number - KB0010002"));
        assert!(prompt.contains("```nginx returns 502```"));
    }
}
