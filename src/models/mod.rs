pub mod etf;
pub mod job;
pub mod portfolio;

pub use etf::{EtfHoldingsSnapshot, EtfMetadata, HoldingLine, HoldingsRepoStats};
pub use job::{Job, JobError, JobErrorKind, JobKind, JobListFilter, JobStatus, Progress, SubmitOptions};
pub use portfolio::{
    CreatePortfolio, FundStatistics, IsinHolding, Portfolio, PortfolioHolding, PortfolioListFilter,
};
