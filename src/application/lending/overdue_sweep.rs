use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::TryStreamExt;
use tokio::task::JoinHandle;

use super::errors::Result;
use super::lending_workflow::LendingWorkflow;

/// 延滞スイープを1回実行する
///
/// 評価日時点で期限を過ぎた貸出中の取引をすべて評価し、延滞として
/// 確認した件数を返す。
///
/// ビジネスルール：
/// - BORROWEDで期限切れの取引はOVERDUEへ再分類する（イベントあり）
/// - 既にOVERDUEの取引は料金のみ再計算する（イベントなし）
/// - RETURNED/LOSTは対象外
///
/// 途中で失敗した場合、それまでに評価した取引の更新は残る。
/// 同じ評価日で再実行すれば同じ状態に収束する。
pub async fn run_overdue_sweep(workflow: &LendingWorkflow, as_of: NaiveDate) -> Result<usize> {
    let overdue_count = workflow
        .ledger()
        .list_overdue(as_of)
        .try_fold(0usize, |count, _| async move { Ok(count + 1) })
        .await?;

    tracing::info!(%as_of, overdue_count, "overdue sweep finished");
    Ok(overdue_count)
}

/// 延滞スイープを一定間隔で実行するタスクを起動する
///
/// 評価日はティックごとのUTCの日付。最初のティックは即座に発火する。
pub fn spawn_periodic_sweep(workflow: Arc<LendingWorkflow>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let today = chrono::Utc::now().date_naive();
            if let Err(e) = run_overdue_sweep(&workflow, today).await {
                tracing::error!(error = %e, "overdue sweep failed");
            }
        }
    })
}
