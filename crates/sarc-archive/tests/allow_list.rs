//! # Allow-list Enforcement
//!
//! A decode must fail with `DisallowedType` whenever the archive reaches a
//! type name the registry does not hold, no matter where in the graph it
//! sits, and must never hand back a partial graph.

use sarc_archive::{
    archive, standard_registry, unarchive, unarchive_opt, Archivable, ArchiveConfig, ArchiveError,
    ErrorKind, FieldError, FieldWriter, NsArray, NsDictionary, NsUrl, ObjectGraph, TypeRegistry,
    Unarchiver, Value,
};

#[derive(Debug, Default, PartialEq)]
struct Token {
    secret: String,
}

impl Archivable for Token {
    fn class_name(&self) -> &str {
        "Token"
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode("secret", self.secret.as_str());
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        if key == "secret" {
            self.secret = value.into_string()?;
        }
        Ok(())
    }
}

fn with_token() -> TypeRegistry {
    TypeRegistry::standard()
        .to_builder()
        .register::<Token>("Token")
        .build()
}

fn token_graph() -> ObjectGraph {
    let mut graph = ObjectGraph::new();
    let token = graph.insert(Token {
        secret: "s3cret".into(),
    });
    graph.set_root(token);
    graph
}

#[test]
fn removed_type_is_disallowed() {
    let bytes = archive(&token_graph()).unwrap();
    assert!(unarchive(&bytes, &with_token()).is_ok());

    let without = with_token().to_builder().remove("Token").build();
    let err = unarchive(&bytes, &without).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisallowedType);
    assert!(matches!(err, ArchiveError::DisallowedType { ref class_name } if class_name == "Token"));
    assert!(unarchive_opt(&bytes, &without).is_none());
}

#[test]
fn nested_disallowed_type_fails_whole_decode() {
    let mut graph = ObjectGraph::new();
    let token = graph.insert(Token {
        secret: "inner".into(),
    });
    let inner = graph.insert(NsArray::new(vec![token.into()]));
    let mut dict = NsDictionary::new();
    dict.insert("payload", inner);
    let root = graph.insert(dict);
    graph.set_root(root);
    let bytes = archive(&graph).unwrap();

    let err = unarchive(&bytes, standard_registry()).unwrap_err();
    assert!(err.is_policy_violation());
    assert!(!err.is_corruption());
}

#[test]
fn empty_registry_admits_only_primitives() {
    let empty = TypeRegistry::empty();
    let bytes = archive(&ObjectGraph::from_value("just a string")).unwrap();
    let graph = unarchive(&bytes, &empty).unwrap();
    assert_eq!(graph.root(), &Value::from("just a string"));

    let bytes = archive(&token_graph()).unwrap();
    assert!(unarchive(&bytes, &empty).is_err());
}

#[test]
fn repeated_registration_is_unobservable() {
    let once = with_token();
    let twice = with_token().to_builder().register::<Token>("Token").build();
    assert_eq!(once.names(), twice.names());

    let bytes = archive(&token_graph()).unwrap();
    let a = unarchive(&bytes, &once).unwrap();
    let b = unarchive(&bytes, &twice).unwrap();
    assert_eq!(a.root_as::<Token>(), b.root_as::<Token>());
    assert_eq!(archive(&a).unwrap(), archive(&b).unwrap());
}

#[test]
fn config_allow_list_narrows_standard_types() {
    let mut graph = ObjectGraph::new();
    let url = graph.insert(NsUrl::new("file:///tmp/x"));
    graph.set_root(url);
    let bytes = archive(&graph).unwrap();

    let config = ArchiveConfig::from_yaml_str("allowed_types: [NSArray, NSDictionary]\n").unwrap();
    let registry = config.registry().unwrap();
    let err = Unarchiver::with_limits(&registry, config.limits)
        .unarchive(&bytes)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::DisallowedType { ref class_name } if class_name == "NSURL"));

    assert!(unarchive(&bytes, standard_registry()).is_ok());
}

#[test]
fn shared_registry_serves_concurrent_decodes() {
    let graph = sarc_archive::json::graph_from_json(&serde_json::json!({"k": [1, 2, 3]}));
    let bytes = archive(&graph).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| unarchive(&bytes, standard_registry()).map(|g| g.len())))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 2);
        }
    });
}
