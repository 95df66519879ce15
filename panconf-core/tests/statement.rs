use panconf_core::{quote_token, render_list, tokenize, Token};
use pretty_assertions::assert_eq;

fn words(tokens: &[Token]) -> Vec<&str> {
    tokens.iter().filter_map(Token::as_word).collect()
}

#[test]
fn group_statement_yields_member_list() {
    let tokens = tokenize("set device-group HQ address-group loop-b static [ loop-a web-srv ]");
    assert_eq!(
        words(&tokens),
        vec!["set", "device-group", "HQ", "address-group", "loop-b", "static"]
    );
    assert_eq!(
        tokens.last().map(Token::values),
        Some(vec!["loop-a", "web-srv"])
    );
}

#[test]
fn quoted_rule_name_and_description_stay_whole() {
    let tokens = tokenize(
        r#"set device-group HQ pre-rulebase security rules "Allow Web" description "it's the web tier""#,
    );
    assert_eq!(tokens[6], Token::Word("Allow Web".to_string()));
    assert_eq!(tokens[8], Token::Word("it's the web tier".to_string()));
}

#[test]
fn rendered_statements_tokenize_back_to_their_parts() {
    let members = ["web srv", "db"];
    let line = format!(
        "set shared address-group {} static {}",
        quote_token("dmz hosts"),
        render_list(&members)
    );
    let tokens = tokenize(&line);
    assert_eq!(tokens[3], Token::Word("dmz hosts".to_string()));
    assert_eq!(tokens[5].values(), vec!["web srv", "db"]);
}
