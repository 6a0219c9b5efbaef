//! Condition pack tests
//!
//! Exercises the built-in `user` and `user_state` packs through the
//! `UserSystem` façade, with and without a bound user.

use roster::users::codec::PropertyValue;
use roster::users::condition::{USER_PACK, USER_STATE_PACK};
use roster::users::event::Event;
use roster::users::record::NewUser;
use roster::{UserSystem, UserSystemConfig};

fn system() -> UserSystem {
    UserSystem::new(UserSystemConfig::default()).unwrap()
}

fn list(items: &[&str]) -> PropertyValue {
    PropertyValue::from(items.to_vec())
}

fn bound_event(system: &UserSystem, new_user: NewUser) -> Event {
    let mut event = Event::new();
    event.bind_user(system.users().create(new_user).unwrap());
    event
}

#[test]
fn test_every_predicate_false_without_user() {
    let system = system();
    let event = Event::new();

    let cases: Vec<(&str, &str, Option<PropertyValue>)> = vec![
        (USER_PACK, "exists", None),
        (
            USER_PACK,
            "has_property_value",
            Some(PropertyValue::from(vec!["last_name", "Rico"])),
        ),
        (USER_PACK, "phone_one_of", Some(list(&["+1"]))),
        (USER_PACK, "email_one_of", Some(list(&["a@b.c"]))),
        (USER_PACK, "username_one_of", Some(list(&["John"]))),
        (USER_STATE_PACK, "is", Some("main_menu".into())),
        (USER_STATE_PACK, "not_set", None),
    ];

    for (pack, condition, argument) in cases {
        let met = system
            .evaluate(&event, pack, condition, argument.as_ref())
            .unwrap_or_else(|e| panic!("{pack}.{condition} raised: {e}"));
        assert!(!met, "{pack}.{condition} should be false without a user");
    }
}

#[test]
fn test_argument_predicates_false_without_user_or_argument() {
    let system = system();
    let event = Event::new();

    for (pack, condition) in [
        (USER_PACK, "has_property_value"),
        (USER_PACK, "phone_one_of"),
        (USER_STATE_PACK, "is"),
    ] {
        let met = system
            .evaluate(&event, pack, condition, None)
            .unwrap_or_else(|e| panic!("{pack}.{condition} raised: {e}"));
        assert!(!met, "{pack}.{condition}");
    }
}

#[test]
fn test_user_exists() {
    let system = system();
    let event = bound_event(&system, NewUser::new("John"));
    assert!(system.evaluate(&event, USER_PACK, "exists", None).unwrap());
}

#[test]
fn test_has_property_value() {
    let system = system();
    let event = bound_event(&system, NewUser::new("John"));
    let argument = PropertyValue::Sequence(vec!["last_name".into(), "LookAtMyHorse".into()]);

    assert!(!system
        .evaluate(&event, USER_PACK, "has_property_value", Some(&argument))
        .unwrap());

    event
        .user()
        .unwrap()
        .set_property("last_name", "LookAtMyHorse")
        .unwrap();
    assert!(system
        .evaluate(&event, USER_PACK, "has_property_value", Some(&argument))
        .unwrap());

    let other = PropertyValue::Sequence(vec!["last_name".into(), "Rico".into()]);
    assert!(!system
        .evaluate(&event, USER_PACK, "has_property_value", Some(&other))
        .unwrap());
}

#[test]
fn test_has_property_value_compares_structured_values() {
    let system = system();
    let event = bound_event(&system, NewUser::new("Counter"));
    event.user().unwrap().set_property("visits", 3i64).unwrap();

    let as_float = PropertyValue::Sequence(vec!["visits".into(), 3.0.into()]);
    let as_string = PropertyValue::Sequence(vec!["visits".into(), "3".into()]);

    assert!(system
        .evaluate(&event, USER_PACK, "has_property_value", Some(&as_float))
        .unwrap());
    assert!(!system
        .evaluate(&event, USER_PACK, "has_property_value", Some(&as_string))
        .unwrap());
}

#[test]
fn test_identity_membership() {
    let system = system();
    let event = bound_event(
        &system,
        NewUser::new("John")
            .with_phone("+15550100")
            .with_email("john@example.com"),
    );

    let eval = |condition: &str, items: &[&str]| {
        system
            .evaluate(&event, USER_PACK, condition, Some(&list(items)))
            .unwrap()
    };

    assert!(eval("phone_one_of", &["+15550100", "+15550199"]));
    assert!(!eval("phone_one_of", &["+15550199"]));
    assert!(eval("email_one_of", &["john@example.com"]));
    assert!(!eval("email_one_of", &[]));
    assert!(eval("username_one_of", &["Jane", "John"]));
    assert!(!eval("username_one_of", &["john"]));
}

#[test]
fn test_unset_identity_field_never_matches() {
    let system = system();
    let event = bound_event(&system, NewUser::new("NoPhone"));
    let argument = PropertyValue::Sequence(vec![PropertyValue::Null, "".into()]);

    assert!(!system
        .evaluate(&event, USER_PACK, "phone_one_of", Some(&argument))
        .unwrap());
}

#[test]
fn test_user_state_predicates() {
    let system = system();
    let event = bound_event(&system, NewUser::new("Stateful"));

    assert!(system
        .evaluate(&event, USER_STATE_PACK, "not_set", None)
        .unwrap());
    for label in ["just_registered", "awaiting_name", ""] {
        assert!(!system
            .evaluate(&event, USER_STATE_PACK, "is", Some(&label.into()))
            .unwrap());
    }

    event.user().unwrap().set_state("just_registered").unwrap();

    assert!(!system
        .evaluate(&event, USER_STATE_PACK, "not_set", None)
        .unwrap());
    assert!(system
        .evaluate(&event, USER_STATE_PACK, "is", Some(&"just_registered".into()))
        .unwrap());
    assert!(!system
        .evaluate(&event, USER_STATE_PACK, "is", Some(&"awaiting_name".into()))
        .unwrap());
}

#[test]
fn test_state_labels_compare_canonically() {
    let system = system();
    let event = bound_event(&system, NewUser::new("Numeric"));
    event.user().unwrap().set_state(2i64).unwrap();

    assert!(system
        .evaluate(&event, USER_STATE_PACK, "is", Some(&2.0.into()))
        .unwrap());
    assert!(!system
        .evaluate(&event, USER_STATE_PACK, "is", Some(&"2".into()))
        .unwrap());
}
