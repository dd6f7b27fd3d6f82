/// 拍卖示例
/// 演示聚合定义、记录命令、提交（含快照压缩）、批量加载与延迟通知
/// 使用内存后端，无需外部依赖
use anyhow::Result as AnyResult;
use evented::aggregate::Effects;
use evented::config::{CommitOptions, RepositoryConfig};
use evented::emitter::Emission;
use evented::persist::memory::{MemoryEventLog, MemorySnapshotStore};
use evented::repository::Repository;
use evented_macros::aggregate;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ulid::Ulid;

// ============================================================================
// 领域模型定义
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
enum AuctionStatus {
    #[default]
    Draft,
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bid {
    bidder: String,
    amount: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Auction {
    title: String,
    status: AuctionStatus,
    highest: Option<Bid>,
    bid_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Open {
    title: String,
}

#[aggregate(name = "auction")]
impl Auction {
    #[command]
    fn open(&mut self, data: Open, fx: &mut Effects<'_>) {
        self.title = data.title;
        self.status = AuctionStatus::Open;
        fx.emit("opened", self.title.clone());
    }

    #[command(name = "place-bid")]
    fn place_bid(&mut self, bid: Bid, _fx: &mut Effects<'_>) {
        self.bid_count += 1;
        let outbid = self.highest.as_ref().is_none_or(|h| bid.amount > h.amount);
        if outbid {
            self.highest = Some(bid);
        }
    }

    #[command]
    fn close(&mut self, _: (), fx: &mut Effects<'_>) {
        self.status = AuctionStatus::Closed;
        if let Some(winner) = &self.highest {
            // 结果只在持久化成功后公布
            fx.enqueue("won", serde_json::json!({ "bidder": winner.bidder, "amount": winner.amount }));
        }
    }
}

// ============================================================================
// 主流程
// ============================================================================

#[tokio::main]
async fn main() -> AnyResult<()> {
    let repo = Repository::<Auction>::new(
        Arc::new(MemoryEventLog::new()),
        Arc::new(MemorySnapshotStore::new()),
        RepositoryConfig::builder().cadence(5).build(),
    )?;

    let mut notices = repo.subscribe();
    tokio::spawn(async move {
        while let Some(Ok(notice)) = notices.next().await {
            println!("notice: {notice:?}");
        }
    });

    let id = Ulid::new().to_string();
    let mut lot = repo.set(&id).await?;
    lot.on("opened", |e: &Emission| println!("opened live: {}", e.args()));
    lot.on("won", |e: &Emission| println!("announced after commit: {}", e.args()));

    lot.record(
        "open",
        Open {
            title: "Vintage typewriter".into(),
        },
    )?;
    for (bidder, amount) in [("martha", 120), ("josh", 150), ("ana", 140), ("bo", 180)] {
        lot.record(
            "place-bid",
            Bid {
                bidder: bidder.into(),
                amount,
            },
        )?;
    }
    lot.record("close", ())?;

    let receipt = repo.commit(&mut lot, CommitOptions::default()).await?;
    println!(
        "committed {} events, revision={}, snapshotted={}",
        receipt.appended, receipt.revision, receipt.snapshotted
    );

    // 第二个拍品，一次批量提交
    let mut others = vec![repo.create("lot-2"), repo.create("lot-3")];
    for (other, title) in others.iter_mut().zip(["Oak desk", "Brass lamp"]) {
        other.record("open", Open { title: title.into() })?;
    }
    repo.commit_many(&mut others, CommitOptions::default()).await?;

    repo.clear_cache();
    for auction in repo.get_all().await? {
        println!(
            "{:?}: {:?} {:?} highest={:?} (revision={}, version={})",
            auction.id(),
            auction.state().title,
            auction.state().status,
            auction.state().highest,
            auction.revision(),
            auction.version()
        );
    }

    tokio::task::yield_now().await;
    Ok(())
}
