use golden_graph_core::db::open_db_in_memory;
use golden_graph_core::{
    AuthorizationError, Caller, DomainDeleteMode, ErrorKind, GraphFilter, GraphService,
    ModelValidationError, NewPrinciple, Principle, PrinciplePatch, Role, ServiceError,
};
use uuid::Uuid;

fn writer(identity: &str) -> Caller {
    Caller::authenticated(identity, Role::Writer)
}

fn admin() -> Caller {
    Caller::authenticated("root", Role::Admin)
}

fn new_principle(text: &str, domain_ids: &[Uuid]) -> NewPrinciple {
    NewPrinciple {
        text: text.to_string(),
        domain_ids: domain_ids.to_vec(),
        reference: None,
    }
}

fn create(service: &GraphService<'_>, caller: &Caller, text: &str, domain_ids: &[Uuid]) -> Principle {
    service
        .create_principle(caller, &new_principle(text, domain_ids))
        .unwrap()
        .principle
}

#[test]
fn writes_without_capability_are_rejected_before_the_store() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);

    let err = service
        .create_domain(&Caller::anonymous(), "Physics")
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Authorization(AuthorizationError::MissingIdentity)
    ));

    let err = service
        .create_domain(&Caller::authenticated("ana", Role::Reader), "Physics")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert!(service.list_domains().unwrap().is_empty());
}

#[test]
fn principle_delete_is_owner_only_but_domain_delete_is_not() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let bob = writer("bob");

    let physics = service.create_domain(&ana, "Physics").unwrap();
    let chemistry = service.create_domain(&ana, "Chemistry").unwrap();
    let principle = create(&service, &ana, "F = ma", &[physics.id, chemistry.id]);
    let neighbour = create(&service, &bob, "p = mv", &[physics.id]);

    for caller in [&bob, &admin()] {
        let err = service.delete_principle(caller, principle.id).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Authorization(AuthorizationError::NotOwner { .. })
        ));
    }
    // A rejected delete leaves the row and its edges in place.
    assert_eq!(service.get_principle(principle.id).unwrap(), principle);
    let incident = service.principle_edges(principle.id).unwrap();
    assert_eq!(incident.len(), 1);
    assert!(incident[0].key().touches(neighbour.id));

    let err = service.delete_principle(&bob, Uuid::new_v4()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Any writer may delete a domain someone else created.
    let removal = service
        .delete_domain(&bob, chemistry.id, DomainDeleteMode::Cascade)
        .unwrap();
    assert_eq!(removal.detached_principle_ids, vec![principle.id]);

    let removal = service.delete_principle(&ana, principle.id).unwrap();
    assert_eq!(removal.principle_id, principle.id);
    let err = service.get_principle(principle.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn duplicate_domain_name_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let physics = service.create_domain(&ana, "Physics").unwrap();
    let math = service.create_domain(&ana, "Math").unwrap();

    let err = service.create_domain(&ana, "PHYSICS").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = service.rename_domain(&ana, math.id, "physics").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let renamed = service
        .rename_domain(&ana, physics.id, "  Classical   Physics ")
        .unwrap();
    assert_eq!(renamed.name, "Classical Physics");
}

#[test]
fn domain_names_collide_across_non_ascii_case() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let economics = service.create_domain(&ana, "Économie").unwrap();
    let optics = service.create_domain(&ana, "Óptica").unwrap();

    let err = service.create_domain(&ana, "économie").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = service.rename_domain(&ana, optics.id, " ÉCONOMIE ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Changing only the case of its own name is allowed.
    let renamed = service.rename_domain(&ana, economics.id, "économie").unwrap();
    assert_eq!(renamed.name, "économie");

    let zeta = service.create_domain(&ana, "zeta").unwrap();
    let names: Vec<String> = service
        .list_domains()
        .unwrap()
        .into_iter()
        .map(|domain| domain.name)
        .collect();
    assert_eq!(names, vec!["zeta", "économie", "Óptica"]);

    // Palette order follows the same key as the listing.
    let legend = service.graph(&GraphFilter::default()).unwrap().layout.legend;
    let legend_ids: Vec<Uuid> = legend.iter().map(|entry| entry.domain_id).collect();
    assert_eq!(legend_ids, vec![zeta.id, economics.id, optics.id]);
}

#[test]
fn domain_delete_restricts_and_cascades() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let physics = service.create_domain(&ana, "Physics").unwrap();
    let math = service.create_domain(&ana, "Math").unwrap();
    let f1 = create(&service, &ana, "F = ma", &[physics.id]);
    let f2 = create(&service, &ana, "E = mc^2", &[physics.id, math.id]);
    let f3 = create(&service, &ana, "pythagoras", &[math.id]);

    let err = service
        .delete_domain(&ana, math.id, DomainDeleteMode::Restrict)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ModelValidationError::DomainInUse {
            principle_count: 2,
            ..
        })
    ));

    // f3 would be left with no domain: nothing changes.
    let before = service.graph(&GraphFilter::default()).unwrap();
    let err = service
        .delete_domain(&ana, math.id, DomainDeleteMode::Cascade)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ModelValidationError::WouldOrphanPrinciple { principle_id, .. })
            if principle_id == f3.id
    ));
    assert_eq!(service.graph(&GraphFilter::default()).unwrap(), before);

    service.delete_principle(&ana, f3.id).unwrap();
    let removal = service
        .delete_domain(&ana, math.id, DomainDeleteMode::Cascade)
        .unwrap();
    assert_eq!(removal.detached_principle_ids, vec![f2.id]);

    let f2_after = service.get_principle(f2.id).unwrap();
    assert_eq!(f2_after.domain_ids, vec![physics.id]);
    assert_eq!(f2_after.version, f2.version + 1);

    let view = service.graph(&GraphFilter::default()).unwrap();
    assert_eq!(view.edges.len(), 1);
    assert_eq!(view.edges[0].shared_domain_ids, vec![physics.id]);
    assert!(view.edges[0].key().touches(f1.id));
    assert!(service.check_edges(&admin()).unwrap().is_consistent());
}

#[test]
fn domain_usage_lists_referencing_principles() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let physics = service.create_domain(&ana, "Physics").unwrap();
    let math = service.create_domain(&ana, "Math").unwrap();
    let f1 = create(&service, &ana, "F = ma", &[physics.id]);
    create(&service, &ana, "pythagoras", &[math.id]);

    let users = service.domain_principles(physics.id).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, f1.id);

    let err = service.domain_principles(Uuid::new_v4()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn version_conflict_surfaces_as_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let physics = service.create_domain(&ana, "Physics").unwrap();
    let principle = create(&service, &ana, "F = ma", &[physics.id]);

    let err = service
        .update_principle(
            &writer("bob"),
            principle.id,
            &PrinciplePatch {
                text: Some("F = dp/dt".to_string()),
                expected_version: Some(principle.version + 1),
                ..PrinciplePatch::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::VersionConflict { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn admin_operations_require_admin_role() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);

    let err = service.rebuild_edges(&writer("ana")).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Authorization(AuthorizationError::AdminRequired)
    ));
    assert!(service.check_edges(&writer("ana")).is_err());

    let delta = service.rebuild_edges(&admin()).unwrap();
    assert_eq!(delta.inserted, 0);
    assert!(service.verify_edges(&admin()).is_ok());
}

#[test]
fn verify_edges_reports_drift_as_consistency_error() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let physics = service.create_domain(&ana, "Physics").unwrap();
    create(&service, &ana, "a", &[physics.id]);
    create(&service, &ana, "b", &[physics.id]);

    conn.execute("DELETE FROM edges;", []).unwrap();
    let err = service.verify_edges(&admin()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency);

    service.rebuild_edges(&admin()).unwrap();
    assert!(service.verify_edges(&admin()).is_ok());
}

#[test]
fn graph_view_carries_layout_and_honors_filters() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(&conn);
    let ana = writer("ana");
    let physics = service.create_domain(&ana, "Physics").unwrap();
    let math = service.create_domain(&ana, "Math").unwrap();
    let f1 = create(&service, &ana, "Newton second law", &[physics.id]);
    let f2 = create(&service, &ana, "Mass energy", &[physics.id, math.id]);
    let f3 = create(&service, &ana, "Pythagoras", &[math.id]);

    let view = service.graph(&GraphFilter::default()).unwrap();
    assert_eq!(view.layout.nodes.len(), 3);
    assert_eq!(view.layout.edges.len(), 2);
    assert_eq!(view.layout.node(f2.id).unwrap().degree, 2);
    assert_eq!(view, service.graph(&GraphFilter::default()).unwrap());

    let json = serde_json::to_value(&view).unwrap();
    assert!(json["principles"][0]["domainIds"].is_array());
    assert!(json["layout"]["sectors"].is_array());
    assert!(json["edges"][0]["sharedDomainIds"].is_array());

    let math_only = service
        .graph(&GraphFilter {
            domain_ids: vec![math.id],
            text: None,
        })
        .unwrap();
    let ids: Vec<Uuid> = math_only.layout.nodes.iter().map(|node| node.id).collect();
    assert!(ids.contains(&f2.id) && ids.contains(&f3.id) && !ids.contains(&f1.id));
    assert_eq!(math_only.layout.node(f2.id).unwrap().degree, 1);
    assert_eq!(math_only.domains.len(), 2);

    let by_text = service
        .graph(&GraphFilter {
            domain_ids: Vec::new(),
            text: Some("NEWTON".to_string()),
        })
        .unwrap();
    assert_eq!(by_text.principles.len(), 1);
    assert!(by_text.edges.is_empty());
}
