use budget_content::ContentTables;
use budget_core::SchoolId;
use budget_engine::{EngineConfig, GameEngine, MonthOutcome};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_months(c: &mut Criterion) {
    let content = ContentTables::builtin().unwrap();
    let mut engine = GameEngine::new(content, EngineConfig::default()).unwrap();
    let school = SchoolId::from("high1");
    engine.select_school(&school).unwrap();
    c.bench_function("advance_month", |b| {
        b.iter(|| {
            if let Ok(MonthOutcome::YearEnded { .. }) = engine.advance_month() {
                engine.reset_game();
                let _ = engine.select_school(&school);
            }
        })
    });
}

criterion_group!(benches, bench_months);
criterion_main!(benches);
