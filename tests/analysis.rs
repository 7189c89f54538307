//! End-to-end analysis scenarios against the builder fixture.

mod common;

use std::collections::HashSet;

use common::{hex, loaded};
use dotlens::{prelude::*, Result};

#[test]
fn test_resolve_round_trip() -> Result<()> {
    let (shop, analyzer) = loaded();

    let order = analyzer.resolve("T:Shop.Order")?.expect("Shop.Order resolves");
    assert_eq!(order.id.token, shop.order);

    let id = order.id.to_string();
    assert!(analyzer.is_well_formed(&id));
    assert_eq!(analyzer.resolve(&id)?, Some(order.clone()));
    assert_eq!(analyzer.normalize(&hex(shop.order))?, Some(id.clone()));
    assert_eq!(analyzer.normalize(&id)?, Some(id));

    let members = analyzer.search_members(&MemberSearch::default().with_page(PageRequest::first(500)))?;
    for summary in &members.items {
        let canonical = summary.id.to_string();
        let resolved = analyzer.resolve(&canonical)?.expect("canonical ids resolve");
        assert_eq!(&resolved, summary);
        assert_eq!(resolved.id.to_string(), canonical);
    }

    assert_eq!(analyzer.resolve("not-an-id")?, None);
    assert!(!analyzer.is_well_formed("not-an-id"));
    Ok(())
}

#[test]
fn test_documentation_ids() -> Result<()> {
    let (shop, analyzer) = loaded();

    let set_total = analyzer
        .resolve("M:Shop.Order.SetTotal(System.Int32)")?
        .expect("documentation id with parameters resolves");
    assert_eq!(set_total.id.token, shop.set_total);

    let total = analyzer.resolve("F:Shop.Order.total")?.expect("field resolves");
    assert_eq!(total.id.token, shop.order_total);
    assert_eq!(total.kind, MemberKind::Field);

    assert_eq!(analyzer.resolve("M:Shop.Order.SetTotal(System.String)")?, None);
    assert_eq!(analyzer.resolve_namespace("N:Shop.Services")?.as_deref(), Some("Shop.Services"));
    assert_eq!(analyzer.resolve_namespace("N:Shop.Missing")?, None);
    Ok(())
}

#[test]
fn test_search_types_simple() -> Result<()> {
    let (shop, analyzer) = loaded();

    let page = analyzer.search_types(&TypeSearch::matching("Simple").with_page(PageRequest::first(10)))?;
    assert_eq!(page.len(), 1);
    assert_eq!(page.items[0].id.token, shop.simple);
    assert_eq!(page.items[0].full_name, "Shop.SimpleClass");
    assert!(!page.has_more);
    assert_eq!(page.next_cursor, None);
    assert_eq!(page.total_count, 1);
    assert!(page.total_is_exact);

    let namespaced = analyzer.search_types(&TypeSearch {
        namespace: Some("Shop.Services".to_string()),
        ..TypeSearch::default()
    })?;
    let names: Vec<&str> = namespaced.items.iter().map(|s| s.full_name.as_str()).collect();
    assert_eq!(names, vec!["Shop.Services.Checkout"]);

    let regex = analyzer.search_types(&TypeSearch {
        query: "^(Order|Customer)$".to_string(),
        use_regex: true,
        ..TypeSearch::default()
    })?;
    assert_eq!(regex.len(), 2);
    Ok(())
}

#[test]
fn test_member_pages() -> Result<()> {
    let (_, analyzer) = loaded();

    let mut seen = HashSet::new();
    let mut request = PageRequest::first(5);
    for _ in 0..3 {
        let page = analyzer.search_members(&MemberSearch::default().with_page(request.clone()))?;
        assert_eq!(page.len(), 5);
        assert!(page.has_more);
        seen.extend(page.items.iter().map(|summary| summary.id));
        request = PageRequest::after(5, page.next_cursor.expect("more pages follow"));
    }
    assert_eq!(seen.len(), 15);
    Ok(())
}

#[test]
fn test_pagination_conservation() -> Result<()> {
    let (_, analyzer) = loaded();

    let everything = analyzer.search_members(&MemberSearch::default().with_page(PageRequest::first(500)))?;
    assert!(!everything.has_more);

    let mut collected = Vec::new();
    let mut request = PageRequest::first(4);
    loop {
        let page = analyzer.search_members(&MemberSearch::default().with_page(request))?;
        collected.extend(page.items);
        match page.next_cursor {
            Some(cursor) => request = PageRequest::after(4, cursor),
            None => break,
        }
    }

    assert_eq!(collected, everything.items);
    Ok(())
}

#[test]
fn test_members_of_type() -> Result<()> {
    let (shop, analyzer) = loaded();

    let methods = analyzer.get_members_of_type(
        "Shop.Order",
        &[MemberKind::Method],
        &PageRequest::default(),
    )?;
    let names: Vec<&str> = methods.items.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![".ctor", "Describe", "GetTotal", "SetTotal"]);

    let types = analyzer.get_types_in_namespace("Shop", &PageRequest::default())?;
    assert_eq!(types.len(), 5);

    let namespaces = analyzer.list_namespaces(&PageRequest::default())?;
    assert_eq!(namespaces.items, vec!["Shop".to_string(), "Shop.Services".to_string()]);

    assert!(matches!(
        analyzer.get_members_of_type(&hex(shop.get_total), &[], &PageRequest::default()),
        Err(Error::NotFound(_))
    ));
    Ok(())
}

#[test]
fn test_field_usages() -> Result<()> {
    let (shop, analyzer) = loaded();

    let page = analyzer.find_usages("F:Shop.Order.total", &PageRequest::default())?;
    assert_eq!(page.len(), 2);
    assert!(page.scan_complete);

    let sources: Vec<Token> = page.items.iter().map(|edge| edge.source.token).collect();
    assert_eq!(sources, vec![shop.get_total, shop.set_total]);
    let kinds: Vec<UsageKind> = page.items.iter().map(|edge| edge.kind).collect();
    assert_eq!(kinds, vec![UsageKind::FieldRead, UsageKind::FieldWrite]);
    assert_eq!(
        page.items[1].snippet.as_deref(),
        Some("IL_0002: stfld System.Int32 Shop.Order::total")
    );
    Ok(())
}

#[test]
fn test_callers_and_callees() -> Result<()> {
    let (shop, analyzer) = loaded();

    let callers = analyzer.find_callers(&hex(shop.order_ctor), &PageRequest::default())?;
    let kinds: Vec<(Token, UsageKind)> = callers
        .items
        .iter()
        .map(|edge| (edge.source.token, edge.kind))
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&(shop.run, UsageKind::NewObject)));

    let callees = analyzer.find_callees(&hex(shop.run), &PageRequest::default())?;
    let targets: Vec<&str> = callees.items.iter().map(|edge| edge.target_name.as_str()).collect();
    assert_eq!(
        targets,
        vec![
            "Shop.Order..ctor",
            "Shop.Order.SetTotal",
            "Shop.Services.Checkout.Process",
            "System.Console.WriteLine",
        ]
    );
    assert!(callees.items[3].external);
    assert_eq!(callees.items[3].target, None);

    assert!(matches!(
        analyzer.find_callers("T:Shop.Order", &PageRequest::default()),
        Err(Error::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_string_literals() -> Result<()> {
    let (shop, analyzer) = loaded();

    let all = analyzer.find_string_literals("", false, &PageRequest::default())?;
    assert_eq!(all.len(), 4);

    let orders = analyzer.find_string_literals("ORDER", false, &PageRequest::default())?;
    let values: Vec<&str> = orders.items.iter().map(|literal| literal.value.as_str()).collect();
    assert_eq!(values, vec!["order", "priority order"]);

    let done = analyzer.find_string_literals("^d.ne$", true, &PageRequest::default())?;
    assert_eq!(done.len(), 1);
    assert_eq!(done.items[0].source.token, shop.run);
    Ok(())
}

#[test]
fn test_type_graph() -> Result<()> {
    let (shop, analyzer) = loaded();

    let derived = analyzer.find_derived_types("T:Shop.Entity", &PageRequest::default())?;
    assert_eq!(derived.len(), 3);
    let depths: Vec<(String, usize)> = derived
        .items
        .iter()
        .map(|endpoint| (endpoint.name.clone(), endpoint.depth))
        .collect();
    assert_eq!(
        depths,
        vec![
            ("Shop.Customer".to_string(), 1),
            ("Shop.Order".to_string(), 1),
            ("Shop.PriorityOrder".to_string(), 2),
        ]
    );

    let bases = analyzer.find_base_types("Shop.PriorityOrder", 10)?;
    let names: Vec<&str> = bases.iter().map(|endpoint| endpoint.name.as_str()).collect();
    assert_eq!(names, vec!["Shop.Order", "Shop.Entity"]);

    let overrides = analyzer.get_overrides(&hex(shop.entity_describe))?;
    assert!(overrides.base_definition.is_none());
    let tokens: HashSet<Token> = overrides.overridden_by.iter().map(|s| s.id.token).collect();
    assert_eq!(
        tokens,
        HashSet::from([shop.order_describe, shop.customer_describe, shop.priority_describe])
    );

    let priority = analyzer.get_overrides(&hex(shop.priority_describe))?;
    assert_eq!(
        priority.base_definition.map(|summary| summary.id.token),
        Some(shop.order_describe)
    );

    assert!(analyzer.get_overloads(&hex(shop.get_total))?.is_empty());
    Ok(())
}

#[test]
fn test_decompile_il() -> Result<()> {
    let (shop, analyzer) = loaded();

    let source = analyzer.decompile(&hex(shop.get_total), DecompileFormat::Il)?;
    assert!(source.text.contains("IL_0001: ldfld System.Int32 Shop.Order::total"));
    assert!(analyzer.decompile(&hex(shop.get_total), DecompileFormat::Il)?.cached);

    assert!(matches!(
        analyzer.decompile(&hex(shop.get_total), DecompileFormat::CSharp),
        Err(Error::NotSupported(_))
    ));
    Ok(())
}
