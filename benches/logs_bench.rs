use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tempfile::tempdir;
use tokio::runtime::Runtime;

use home_finance_server::database::{Db, init_db};
use home_finance_server::logs::query_logs;
use home_finance_server::models::LogQueryParams;

// Benchmark constants
const BENCH_LOG_COUNT: usize = 2000;

async fn setup_benchmark_db() -> (Db, tempfile::TempDir) {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let data_path = temp_dir.path().to_str().unwrap().to_string();
    let db = init_db(&data_path).await.unwrap();
    (db, temp_dir)
}

async fn create_benchmark_logs(db: &Db, count: usize) {
    let conn = db.write().await;
    for i in 0..count {
        let accion = match i % 4 {
            0 => "crear",
            1 => "actualizar",
            2 => "eliminar",
            _ => "login_exitoso",
        };
        let tabla = if i % 2 == 0 { "expenses" } else { "usuarios" };
        let usuario = format!("usuario_{}", i % 25);
        let ip = format!("10.0.{}.{}", i % 256, (i / 256) % 256);

        conn.execute(
            "INSERT INTO logs (accion, tabla, usuario, ip, dispositivo) VALUES (?, ?, ?, ?, 'bench-agent')",
            (accion, tabla, usuario.as_str(), ip.as_str()),
        )
        .await
        .unwrap();
    }
}

fn bench_log_queries(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (db, _temp_dir) = rt.block_on(async {
        let (db, temp_dir) = setup_benchmark_db().await;
        create_benchmark_logs(&db, BENCH_LOG_COUNT).await;
        (db, temp_dir)
    });

    c.bench_function("query_logs_default_page", |b| {
        b.to_async(&rt).iter(|| async {
            let response = query_logs(&db, &LogQueryParams::default()).await.unwrap();
            black_box(response);
        });
    });

    c.bench_function("query_logs_filtered", |b| {
        let params = LogQueryParams {
            accion: Some("crear".to_string()),
            usuario: Some("usuario_3".to_string()),
            ..Default::default()
        };
        b.to_async(&rt).iter(|| async {
            let response = query_logs(&db, &params).await.unwrap();
            black_box(response);
        });
    });

    c.bench_function("query_logs_sorted_deep_page", |b| {
        let params = LogQueryParams {
            sort_by: Some("usuario".to_string()),
            sort_order: Some("asc".to_string()),
            page: Some(50),
            per_page: Some(20),
            ..Default::default()
        };
        b.to_async(&rt).iter(|| async {
            let response = query_logs(&db, &params).await.unwrap();
            black_box(response);
        });
    });
}

criterion_group!(benches, bench_log_queries);
criterion_main!(benches);
