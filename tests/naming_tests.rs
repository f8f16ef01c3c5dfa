// Collection naming tests: data models, namespace budget, hashing, removal plans

mod common;

use common::{identity, numeric_event};
use sth::error::NamingError;
use sth::history_store::naming::{
    DocumentFilter, MAX_NAMESPACE_SIZE_IN_BYTES, NamingResolver, RemovalPlan, generate_hash,
    is_aggregated, namespace,
};
use sth::models::{DataModel, Identity, IdentityFields, RemovalScope};

fn resolver(data_model: DataModel, should_hash: bool) -> NamingResolver {
    NamingResolver::new("sth_", "sth_", data_model, should_hash)
}

#[test]
fn database_name_is_prefix_plus_service() {
    let naming = resolver(DataModel::CollectionPerEntity, false);
    assert_eq!(naming.database_name("smartcity"), "sth_smartcity");
}

#[test]
fn literal_names_per_data_model() {
    let id = identity("Speed");
    let cases = [
        (DataModel::CollectionPerServicePath, "sth_/parking"),
        (DataModel::CollectionPerEntity, "sth_/parking_car1_car"),
        (DataModel::CollectionPerAttribute, "sth_/parking_car1_car_speed"),
    ];
    for (model, expected) in cases {
        let naming = resolver(model, false);
        assert_eq!(naming.raw_collection_name(&id).unwrap(), expected);
        assert_eq!(
            naming.aggregated_collection_name(&id).unwrap(),
            format!("{}.aggr", expected)
        );
    }
}

#[test]
fn entity_type_is_omitted_when_absent() {
    let id = Identity::new("smartcity", "/parking", "Car1", None, "speed");
    let naming = resolver(DataModel::CollectionPerAttribute, false);
    assert_eq!(
        naming.raw_collection_name(&id).unwrap(),
        "sth_/parking_car1_speed"
    );
}

#[test]
fn aggregated_suffix_detection() {
    assert!(is_aggregated("sth_/parking_car1.aggr"));
    assert!(!is_aggregated("sth_/parking_car1"));
    assert!(!is_aggregated("sth_/parking.aggregates"));
}

#[test]
fn literal_name_fits_budget_exactly() {
    let naming = resolver(DataModel::CollectionPerServicePath, false);
    // "sth_s" + "." + "sth_" + segment + ".aggr" = 15 + segment bytes
    let fits = Identity::new("s", "x".repeat(98), "e", None, "a");
    let name = naming.aggregated_collection_name(&fits).unwrap();
    assert_eq!(namespace("sth_s", &name).len(), MAX_NAMESPACE_SIZE_IN_BYTES);

    let too_long = Identity::new("s", "x".repeat(99), "e", None, "a");
    let err = naming.raw_collection_name(&too_long).unwrap_err();
    assert!(matches!(
        err,
        NamingError::NamespaceTooLong { size: 114, budget: 113, .. }
    ));
}

#[test]
fn hash_names_fill_the_budget() {
    let naming = resolver(DataModel::CollectionPerEntity, true);
    let id = identity("speed");
    let database = naming.database_name(&id.service);
    let limit = naming.hash_size_in_bytes(&database);
    assert_eq!(limit, 113 - 13 - 1 - 4 - 5);

    let raw = naming.raw_collection_name(&id).unwrap();
    assert_eq!(raw.len(), 4 + limit as usize);
    assert!(raw.starts_with("sth_"));
    assert!(raw[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(&raw[4..], generate_hash("/parking_car1_car", limit as usize).as_str());

    let aggregated = naming.aggregated_collection_name(&id).unwrap();
    assert_eq!(aggregated, format!("{}.aggr", raw));
    assert_eq!(namespace(&database, &aggregated).len(), MAX_NAMESPACE_SIZE_IN_BYTES);
}

#[test]
fn hash_is_truncated_sha512_hex() {
    assert_eq!(generate_hash("", 16), "cf83e1357eefb8bd");
    assert_eq!(generate_hash("abc", 500).len(), 128);
}

#[test]
fn hash_names_distinguish_long_identities() {
    let naming = resolver(DataModel::CollectionPerEntity, true);
    let long_prefix = "x".repeat(200);
    let a = Identity::new("smartcity", "/parking", format!("{}a", long_prefix), None, "speed");
    let b = Identity::new("smartcity", "/parking", format!("{}b", long_prefix), None, "speed");
    assert_ne!(
        naming.raw_collection_name(&a).unwrap(),
        naming.raw_collection_name(&b).unwrap()
    );
}

#[test]
fn hash_budget_too_small_is_a_naming_error() {
    let naming = NamingResolver::new("x".repeat(90), "sth_", DataModel::CollectionPerEntity, true);
    let err = naming.raw_collection_name(&identity("speed")).unwrap_err();
    match err {
        NamingError::HashBudgetTooSmall {
            available,
            required,
            ..
        } => {
            assert!(available < 20);
            assert_eq!(required, 20);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn registry_collection_uses_collection_prefix() {
    let naming = resolver(DataModel::CollectionPerEntity, true);
    assert_eq!(naming.registry_collection_name(), "sth_collection_names");
}

#[test]
fn raw_documents_carry_fields_missing_from_the_name() {
    let id = identity("speed");
    let event = numeric_event(&id, 1.0, "2024-03-15T10:22:07Z");

    let doc = resolver(DataModel::CollectionPerServicePath, false)
        .strategy()
        .build_raw_document(&event);
    assert_eq!(
        doc.identity,
        IdentityFields {
            entity_id: Some("Car1".into()),
            entity_type: Some("Car".into()),
            attr_name: Some("speed".into()),
        }
    );

    let doc = resolver(DataModel::CollectionPerEntity, false)
        .strategy()
        .build_raw_document(&event);
    assert_eq!(doc.identity.attr_name.as_deref(), Some("speed"));
    assert!(doc.identity.entity_id.is_none());

    let doc = resolver(DataModel::CollectionPerAttribute, false)
        .strategy()
        .build_raw_document(&event);
    assert_eq!(doc.identity, IdentityFields::default());
}

#[test]
fn raw_document_time_prefers_time_instant() {
    let id = identity("speed");
    let event = numeric_event(&id, 1.0, "2024-03-15T10:22:07Z")
        .with_time_instant(common::ts("2024-03-15T09:00:00Z"));
    let doc = resolver(DataModel::CollectionPerEntity, false)
        .strategy()
        .build_raw_document(&event);
    assert_eq!(doc.recv_time, common::ts("2024-03-15T09:00:00Z"));
}

#[test]
fn collection_fields_follow_data_model() {
    let id = identity("speed");
    let fields = resolver(DataModel::CollectionPerEntity, false)
        .strategy()
        .collection_fields(&id);
    assert_eq!(fields.entity_id.as_deref(), Some("Car1"));
    assert_eq!(fields.entity_type.as_deref(), Some("Car"));
    assert!(fields.attr_name.is_none());
}

#[test]
fn removal_plans_per_service_path() {
    let strategy = resolver(DataModel::CollectionPerServicePath, false);
    let scope = RemovalScope::service_path("smartcity", "/parking");
    assert_eq!(
        strategy.strategy().removal_plan(&scope).unwrap(),
        RemovalPlan::DropCollection {
            segment: "/parking".into()
        }
    );
    let scope = scope.entity("Car1", Some("Car"));
    assert_eq!(
        strategy.strategy().removal_plan(&scope).unwrap(),
        RemovalPlan::DeleteDocuments {
            segment: "/parking".into(),
            filter: DocumentFilter {
                entity_id: Some("Car1".into()),
                entity_type: Some("Car".into()),
                attr_name: None,
            },
        }
    );
}

#[test]
fn removal_plans_per_entity() {
    let naming = resolver(DataModel::CollectionPerEntity, false);
    let strategy = naming.strategy();
    let scope = RemovalScope::service_path("smartcity", "/parking");
    assert_eq!(
        strategy.removal_plan(&scope).unwrap(),
        RemovalPlan::DropPrefix {
            segment_prefix: "/parking_".into()
        }
    );
    let entity = scope.clone().entity("Car1", Some("Car"));
    assert_eq!(
        strategy.removal_plan(&entity).unwrap(),
        RemovalPlan::DropCollection {
            segment: "/parking_Car1_Car".into()
        }
    );
    let attribute = entity.attribute("speed");
    assert_eq!(
        strategy.removal_plan(&attribute).unwrap(),
        RemovalPlan::DeleteDocuments {
            segment: "/parking_Car1_Car".into(),
            filter: DocumentFilter {
                attr_name: Some("speed".into()),
                ..DocumentFilter::default()
            },
        }
    );
    assert!(strategy.removal_plan(&scope.attribute("speed")).is_err());
}

#[test]
fn removal_plans_per_attribute() {
    let naming = resolver(DataModel::CollectionPerAttribute, false);
    let strategy = naming.strategy();
    let entity = RemovalScope::service_path("smartcity", "/parking").entity("Car1", None);
    assert_eq!(
        strategy.removal_plan(&entity).unwrap(),
        RemovalPlan::DropPrefix {
            segment_prefix: "/parking_Car1_".into()
        }
    );
    assert_eq!(
        strategy.removal_plan(&entity.attribute("speed")).unwrap(),
        RemovalPlan::DropCollection {
            segment: "/parking_Car1_speed".into()
        }
    );
}
