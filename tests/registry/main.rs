use brain::registry::{CapabilityRegistries, RegistryConfig};

fn registries() -> CapabilityRegistries {
    CapabilityRegistries::new(
        &RegistryConfig::default(),
        vec![
            "openai".to_string(),
            "anthropic".to_string(),
            "gemini".to_string(),
        ],
        vec!["tavily_search".to_string()],
        vec!["knowledge_base".to_string()],
    )
}

#[test]
fn given_same_query_when_checked_repeatedly_then_answers_never_change() {
    let registries = registries();
    let first = registries.check_provider_and_model("openai", Some("gpt-4o"));
    for _ in 0..3 {
        assert_eq!(registries.check_provider_and_model("openai", Some("gpt-4o")), first);
        assert!(registries.check_tool_available("tavily_search"));
        assert!(!registries.check_data_source_available("conversation_history"));
    }
    assert!(first.valid);
}

#[test]
fn given_unknown_provider_when_checked_then_available_providers_are_listed() {
    let check = registries().check_provider_and_model("mistral", None);
    assert!(!check.valid);
    assert_eq!(
        check.errors,
        vec![r#"Provider 'mistral' not found. Available: ["anthropic", "gemini", "openai"]"#]
    );
    assert!(check.info.is_none());
}

#[test]
fn given_model_of_another_provider_when_checked_then_owner_is_named() {
    let check = registries().check_provider_and_model("openai", Some("gemini-1.5-pro"));
    assert!(!check.valid);
    assert!(
        check.errors[0]
            .starts_with("Model 'gemini-1.5-pro' belongs to provider 'gemini', not 'openai'"),
        "{}",
        check.errors[0]
    );
}

#[test]
fn given_unknown_model_when_checked_then_it_is_not_found_anywhere() {
    let check = registries().check_provider_and_model("anthropic", Some("claude-9"));
    assert!(!check.valid);
    assert!(check.errors[0].starts_with("Model 'claude-9' not found in any provider"));
}

#[test]
fn given_no_model_when_checked_then_provider_default_is_resolved() {
    let registries = registries();
    let check = registries.check_provider_and_model("gemini", None);
    assert!(check.valid);
    let info = check.info.expect("valid check should carry info");
    assert_eq!(info.model, "gemini-1.5-flash");
    assert!(info.available);
    assert_eq!(registries.providers.default_model("openai"), Some("gpt-4o-mini"));
}

#[test]
fn given_configured_but_uninstalled_capability_when_checked_then_it_is_unavailable() {
    let registries = registries();
    assert!(registries.check_data_source_available("knowledge_base"));
    assert!(!registries.check_data_source_available("conversation_history"));
    assert!(!registries.check_tool_available("weather"));
    assert_eq!(registries.tools.names(), vec!["tavily_search"]);
}
