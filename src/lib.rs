pub mod address;
pub mod carbon;
pub mod energy;
pub mod energy_star;
pub mod fixer;
pub mod format;
pub mod geo;
pub mod geocode;
pub mod http;
pub mod images;
pub mod links;
pub mod logos;
pub mod matcher;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod rates;
pub mod report;
pub mod savings;
pub mod scraper;
pub mod search;
pub mod table;
pub mod valuation;
pub mod verticals;
