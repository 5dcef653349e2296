// Tier 3: Scoring
//
// Modules in this tier stabilise rate metrics, score performance and build the
// three output tables. Every score reads shrunk rates, never observed ones.
//
// Contract: &[T: PerformanceSample] -> Vec<ShrinkageResult> -> Scores -> output rows

pub mod bayes_shrinkage;  // Empirical Bayes shrinkage toward per-source priors
pub mod scorer;           // Efficiency, quality, volume and recommendation
pub mod output_builder;   // Daily, ad-set and ad tables
