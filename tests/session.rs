mod common;

use tokio::sync::mpsc;

use common::{FakeCatalog, FakeRetail, StubEmbedder, catalog_row, retail_product};
use zakupki_matcher::processing::{
    CancelToken, Outcome, Phase, PhasePayload, PhaseReport, Session, SessionEnd, SessionError,
};

type SessionParts = (
    Session<FakeRetail, FakeCatalog, StubEmbedder>,
    mpsc::UnboundedReceiver<PhaseReport>,
    mpsc::UnboundedSender<String>,
    CancelToken,
);

fn build_session(retail: FakeRetail, catalog: FakeCatalog, embedder: StubEmbedder) -> SessionParts {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (selections_tx, selections_rx) = mpsc::unbounded_channel();
    let cancel = CancelToken::new();
    let session = Session::new(
        retail,
        catalog,
        embedder,
        events_tx,
        selections_rx,
        cancel.clone(),
    );
    (session, events_rx, selections_tx, cancel)
}

fn drain(events_rx: &mut mpsc::UnboundedReceiver<PhaseReport>) -> Vec<PhaseReport> {
    let mut reports = Vec::new();
    while let Ok(report) = events_rx.try_recv() {
        reports.push(report);
    }
    reports
}

fn laptop_retail() -> FakeRetail {
    FakeRetail {
        url: "https://www.citilink.ru/product/noutbuk-123/".to_string(),
        product: retail_product(
            "Ноутбук HUAWEI MateBook D15",
            "54 990",
            &[
                ("Оперативная память", "8 ГБ"),
                ("Тип устройства", "ноутбук"),
            ],
        ),
    }
}

fn laptop_embedder() -> StubEmbedder {
    StubEmbedder::new(&[
        &[
            "Оперативная память",
            "Объём оперативной памяти",
            "Объем оперативной памяти",
        ],
        &["Тип устройства", "Тип"],
    ])
}

fn laptop_entries() -> Vec<(String, String)> {
    vec![
        (
            "https://moy-zakupki.ru/ktru/1-1/".to_string(),
            "Ноутбук (Объём оперативной памяти:≥ 4)".to_string(),
        ),
        (
            "https://moy-zakupki.ru/ktru/1-2/".to_string(),
            "Ноутбук (Объём оперативной памяти:≥ 8)".to_string(),
        ),
    ]
}

fn laptop_rows() -> Vec<zakupki_matcher::domain::attribute::CatalogRow> {
    vec![
        catalog_row(
            0,
            "Объем оперативной памяти, ГБ",
            &[("≥ 4", "/select/mem-4"), ("≥ 8", "/select/mem-8")],
        ),
        catalog_row(
            1,
            "Тип",
            &[("ноутбук", "/select/type-nb"), ("моноблок", "/select/type-mb")],
        ),
    ]
}

#[tokio::test]
async fn full_session_resolves_rows_and_activates_matches() {
    let catalog = FakeCatalog::new(laptop_entries(), laptop_rows());
    let activated = catalog.activated.clone();
    let (mut session, mut events_rx, _selections_tx, _cancel) =
        build_session(laptop_retail(), catalog, laptop_embedder());

    let end = session
        .run("Ноутбук HUAWEI MateBook D15")
        .await
        .expect("session should complete");
    assert_eq!(end, SessionEnd::Completed);

    let reports = drain(&mut events_rx);
    let phases: Vec<Phase> = reports.iter().map(|r| r.phase).collect();
    assert_eq!(
        phases,
        vec![
            Phase::RetailSearch,
            Phase::RetailParse,
            Phase::CatalogSearch,
            Phase::CatalogParse,
        ]
    );

    // The 8 GB sub-entry is closer to the retail value than the 4 GB one.
    let Outcome::Success(PhasePayload::CatalogEntry { url, .. }) = &reports[2].outcome else {
        panic!("expected a catalog entry outcome");
    };
    assert_eq!(url, "https://moy-zakupki.ru/ktru/1-2/");

    let Outcome::Success(PhasePayload::CatalogAttributes { records, matches }) =
        &reports[3].outcome
    else {
        panic!("expected catalog attributes");
    };

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].default_value, "≥ 8");
    assert_eq!(records[0].description, "Оперативная память");
    assert_eq!(records[1].default_value, "ноутбук");
    assert_eq!(records[1].description, "Тип устройства");

    // Resolved values are members of the row's own candidate list.
    for record in records {
        if !record.default_value.is_empty() {
            assert!(record.values.contains(&record.default_value));
        }
    }

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].source, 0);
    assert_eq!(matches[0].target, 0);
    assert_eq!(matches[1].source, 1);
    assert_eq!(matches[1].target, 1);

    let activated = activated.lock().expect("activated mutex poisoned");
    let tokens: Vec<&str> = activated.iter().map(|h| h.token.as_str()).collect();
    assert_eq!(tokens, vec!["/select/mem-8", "/select/type-nb"]);
}

#[tokio::test]
async fn ambiguous_category_waits_for_a_human_selection() {
    // Cartridge types are neither numeric nor an exact hit for the retail
    // value, so the session must hand the choice over.
    let entries = vec![
        (
            "https://moy-zakupki.ru/ktru/2-1/".to_string(),
            "Картридж (Тип картриджа:лазерный)".to_string(),
        ),
        (
            "https://moy-zakupki.ru/ktru/2-2/".to_string(),
            "Картридж (Тип картриджа:матричный)".to_string(),
        ),
    ];
    let rows = vec![catalog_row(
        0,
        "Тип картриджа",
        &[("лазерный", "/select/laser"), ("матричный", "/select/dot")],
    )];

    let retail = FakeRetail {
        url: "https://www.citilink.ru/product/kartridzh-305/".to_string(),
        product: retail_product(
            "Картридж HP 305A",
            "5 990",
            &[("Тип картриджа", "струйный цветной")],
        ),
    };
    let embedder = StubEmbedder::new(&[&["Тип картриджа"]]);

    let catalog = FakeCatalog::new(entries, rows);
    let (mut session, mut events_rx, selections_tx, _cancel) =
        build_session(retail, catalog, embedder);

    // The user's pick is queued up front; the channel buffers it until the
    // session asks.
    selections_tx
        .send("https://moy-zakupki.ru/ktru/2-1/".to_string())
        .expect("selection channel open");

    let end = session.run("Картридж HP 305A").await.expect("session runs");
    assert_eq!(end, SessionEnd::Completed);

    let reports = drain(&mut events_rx);
    assert!(matches!(reports[2].outcome, Outcome::Fail(_)));
    let Outcome::Fail(disambiguation) = &reports[2].outcome else {
        unreachable!();
    };
    assert_eq!(disambiguation.category, "Тип картриджа");
    assert_eq!(disambiguation.entries.len(), 2);

    // After the selection the phase reports success for the chosen entry.
    let Outcome::Success(PhasePayload::CatalogEntry { url, name }) = &reports[3].outcome else {
        panic!("expected the selected entry");
    };
    assert_eq!(url, "https://moy-zakupki.ru/ktru/2-1/");
    assert_eq!(name, "Картридж (Тип картриджа:лазерный)");

    assert_eq!(reports[4].phase, Phase::CatalogParse);
    assert!(matches!(reports[4].outcome, Outcome::Success(_)));
}

#[tokio::test]
async fn closed_selection_channel_counts_as_a_stop() {
    let entries = vec![(
        "https://moy-zakupki.ru/ktru/2-1/".to_string(),
        "Картридж (Тип картриджа:лазерный)".to_string(),
    )];
    let retail = FakeRetail {
        url: "https://www.citilink.ru/product/kartridzh-305/".to_string(),
        product: retail_product("Картридж HP 305A", "5 990", &[("Тип картриджа", "струйный")]),
    };
    let embedder = StubEmbedder::new(&[&["Тип картриджа"]]);
    let catalog = FakeCatalog::new(entries, vec![]);

    let (mut session, mut events_rx, selections_tx, _cancel) =
        build_session(retail, catalog, embedder);
    drop(selections_tx);

    let end = session.run("Картридж HP 305A").await.expect("session runs");
    assert_eq!(end, SessionEnd::Stopped);

    let reports = drain(&mut events_rx);
    let last = reports.last().expect("at least one report");
    assert_eq!(last.phase, Phase::CatalogSearch);
    assert!(matches!(last.outcome, Outcome::Stopped));
}

#[tokio::test]
async fn cancellation_before_the_first_phase_stops_immediately() {
    let catalog = FakeCatalog::new(laptop_entries(), laptop_rows());
    let (mut session, mut events_rx, _selections_tx, cancel) =
        build_session(laptop_retail(), catalog, laptop_embedder());

    cancel.cancel();

    let end = session.run("Ноутбук").await.expect("session runs");
    assert_eq!(end, SessionEnd::Stopped);

    let reports = drain(&mut events_rx);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].phase, Phase::RetailSearch);
    assert!(matches!(reports[0].outcome, Outcome::Stopped));
}

#[tokio::test]
async fn cancellation_between_rows_stops_the_match_phase() {
    let mut catalog = FakeCatalog::new(laptop_entries(), laptop_rows());
    let cancel_token = CancelToken::new();
    catalog.cancel_on_activate = Some(cancel_token.clone());

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (_selections_tx, selections_rx) = mpsc::unbounded_channel::<String>();
    let mut session = Session::new(
        laptop_retail(),
        catalog,
        laptop_embedder(),
        events_tx,
        selections_rx,
        cancel_token,
    );

    let end = session.run("Ноутбук").await.expect("session runs");
    assert_eq!(end, SessionEnd::Stopped);

    let reports = drain(&mut events_rx);
    let last = reports.last().expect("reports present");
    assert_eq!(last.phase, Phase::CatalogParse);
    assert!(matches!(last.outcome, Outcome::Stopped));
    // No attribute payload was published for the interrupted phase.
    assert!(!reports.iter().any(|report| matches!(
        report.outcome,
        Outcome::Success(PhasePayload::CatalogAttributes { .. })
    )));
}

#[tokio::test]
async fn activation_failure_keeps_the_decision_and_the_session() {
    let mut catalog = FakeCatalog::new(laptop_entries(), laptop_rows());
    catalog.fail_activation = true;

    let (mut session, mut events_rx, _selections_tx, _cancel) =
        build_session(laptop_retail(), catalog, laptop_embedder());

    let end = session.run("Ноутбук").await.expect("session survives");
    assert_eq!(end, SessionEnd::Completed);

    let reports = drain(&mut events_rx);
    let Outcome::Success(PhasePayload::CatalogAttributes { records, .. }) =
        &reports.last().expect("final report").outcome
    else {
        panic!("expected catalog attributes");
    };
    assert_eq!(records[0].default_value, "≥ 8");
    assert_eq!(records[0].description, "Оперативная память");
}

#[tokio::test]
async fn embedding_failure_is_fatal_to_the_match_operation() {
    let catalog = FakeCatalog::new(laptop_entries(), laptop_rows());
    let mut embedder = laptop_embedder();
    embedder.fail = true;

    let (mut session, mut events_rx, _selections_tx, _cancel) =
        build_session(laptop_retail(), catalog, embedder);

    let result = session.run("Ноутбук").await;
    assert!(matches!(
        result,
        Err(SessionError::Match(
            zakupki_matcher::processing::MatchError::EmbeddingUnavailable(_)
        ))
    ));

    // The retail phases completed before the failure.
    let reports = drain(&mut events_rx);
    assert_eq!(reports.len(), 2);
    assert!(matches!(reports[0].outcome, Outcome::Success(_)));
    assert!(matches!(reports[1].outcome, Outcome::Success(_)));
}

#[tokio::test]
async fn rows_without_a_counterpart_stay_unresolved() {
    let mut rows = laptop_rows();
    rows.push(catalog_row(
        2,
        "Гарантия продавца",
        &[("≤ 5", "/select/w-5"), ("≤ 7", "/select/w-7")],
    ));
    let catalog = FakeCatalog::new(laptop_entries(), rows);

    let (mut session, mut events_rx, _selections_tx, _cancel) =
        build_session(laptop_retail(), catalog, laptop_embedder());

    session.run("Ноутбук").await.expect("session runs");

    let reports = drain(&mut events_rx);
    let Outcome::Success(PhasePayload::CatalogAttributes { records, matches }) =
        &reports.last().expect("final report").outcome
    else {
        panic!("expected catalog attributes");
    };

    // The warranty row nearest-matches some retail label, but its value
    // reconciles with nothing, so the row keeps an empty default.
    let warranty = &records[2];
    assert_eq!(warranty.default_value, "");
    assert_eq!(warranty.description, "");
    assert_eq!(matches.len(), 2);
}
