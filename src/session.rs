use std::fmt;

use crate::config::DatePolicy;
use crate::domain::{DatasetDescriptor, DatasetId, DateWindow};
use crate::error::ExplorerError;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Searched,
    RangeSelected {
        selection: Vec<DatasetDescriptor>,
        window: DateWindow,
    },
    Fetching {
        selection: Vec<DatasetDescriptor>,
        window: DateWindow,
    },
    Fetched {
        window: DateWindow,
        succeeded: Vec<DatasetId>,
        failed: Vec<DatasetId>,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Searched => "searched",
            SessionState::RangeSelected { .. } => "range-selected",
            SessionState::Fetching { .. } => "fetching",
            SessionState::Fetched { .. } => "fetched",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Explorer flow: idle -> searched -> range-selected -> fetching -> fetched.
/// A new search is allowed from any state except while fetching.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    state: SessionState,
    query: Option<String>,
    results: Vec<DatasetDescriptor>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            query: None,
            results: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn results(&self) -> &[DatasetDescriptor] {
        &self.results
    }

    pub fn search_completed(
        &mut self,
        query: &str,
        results: Vec<DatasetDescriptor>,
    ) -> Result<(), ExplorerError> {
        self.guard_not_fetching("search")?;
        self.query = Some(query.to_string());
        self.results = results;
        self.state = SessionState::Searched;
        Ok(())
    }

    /// A failed search drops every earlier result.
    pub fn search_failed(&mut self) {
        self.reset();
    }

    pub fn select(
        &mut self,
        ids: &[DatasetId],
        window: DateWindow,
        policy: &DatePolicy,
    ) -> Result<(), ExplorerError> {
        match self.state {
            SessionState::Searched
            | SessionState::RangeSelected { .. }
            | SessionState::Fetched { .. } => {}
            _ => return Err(self.invalid("select datasets")),
        }
        if ids.is_empty() {
            return Err(ExplorerError::InvalidTransition {
                action: "select datasets".to_string(),
                state: "an empty selection".to_string(),
            });
        }
        policy.check(&window)?;
        let selection = ids
            .iter()
            .map(|id| {
                self.results
                    .iter()
                    .find(|item| &item.id == id)
                    .cloned()
                    .ok_or_else(|| {
                        ExplorerError::InvalidDatasetId(format!("{id} is not in the search results"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.state = SessionState::RangeSelected { selection, window };
        Ok(())
    }

    pub fn begin_fetch(&mut self) -> Result<(Vec<DatasetDescriptor>, DateWindow), ExplorerError> {
        let SessionState::RangeSelected { selection, window } = &self.state else {
            return Err(self.invalid("fetch"));
        };
        let (selection, window) = (selection.clone(), *window);
        self.state = SessionState::Fetching {
            selection: selection.clone(),
            window,
        };
        Ok((selection, window))
    }

    pub fn finish_fetch(
        &mut self,
        succeeded: Vec<DatasetId>,
        failed: Vec<DatasetId>,
    ) -> Result<(), ExplorerError> {
        let SessionState::Fetching { window, .. } = &self.state else {
            return Err(self.invalid("finish fetching"));
        };
        self.state = SessionState::Fetched {
            window: *window,
            succeeded,
            failed,
        };
        Ok(())
    }

    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.query = None;
        self.results.clear();
    }

    fn guard_not_fetching(&self, action: &str) -> Result<(), ExplorerError> {
        if matches!(self.state, SessionState::Fetching { .. }) {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    fn invalid(&self, action: &str) -> ExplorerError {
        ExplorerError::InvalidTransition {
            action: action.to_string(),
            state: self.state.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeySource;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    fn descriptor(id: &str) -> DatasetDescriptor {
        DatasetDescriptor {
            id: id.parse().unwrap(),
            name_en: format!("Dataset {id}"),
            name_fi: String::new(),
            data_period_en: "15 min".to_string(),
            data_period_fi: String::new(),
            unit_en: "MW".to_string(),
            unit_fi: String::new(),
            search_score: 1.0,
            description_en: String::new(),
            description_fi: String::new(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(), today()).unwrap()
    }

    #[test]
    fn full_flow() {
        let policy = DatePolicy::for_source(KeySource::Environment, today());
        let mut session = Session::new();
        session
            .search_completed("wind", vec![descriptor("75"), descriptor("181")])
            .unwrap();
        session
            .select(&["181".parse().unwrap()], window(), &policy)
            .unwrap();
        let (selection, _) = session.begin_fetch().unwrap();
        assert_eq!(selection.len(), 1);
        assert_eq!(session.state().name(), "fetching");
        session
            .finish_fetch(vec!["181".parse().unwrap()], Vec::new())
            .unwrap();
        assert_matches!(session.state(), SessionState::Fetched { succeeded, .. } if succeeded.len() == 1);
    }

    #[test]
    fn fetch_requires_selection() {
        let mut session = Session::new();
        assert_matches!(
            session.begin_fetch(),
            Err(ExplorerError::InvalidTransition { state, .. }) if state == "idle"
        );
    }

    #[test]
    fn selection_must_come_from_results() {
        let policy = DatePolicy::for_source(KeySource::User, today());
        let mut session = Session::new();
        session.search_completed("wind", vec![descriptor("75")]).unwrap();
        let result = session.select(&["999".parse().unwrap()], window(), &policy);
        assert_matches!(result, Err(ExplorerError::InvalidDatasetId(_)));
        assert_eq!(session.state(), &SessionState::Searched);
    }

    #[test]
    fn failed_search_resets() {
        let mut session = Session::new();
        session.search_completed("wind", vec![descriptor("75")]).unwrap();
        session.search_failed();
        assert_eq!(session.state(), &SessionState::Idle);
        assert!(session.results().is_empty());
    }

    #[test]
    fn cannot_search_while_fetching() {
        let policy = DatePolicy::for_source(KeySource::User, today());
        let mut session = Session::new();
        session.search_completed("wind", vec![descriptor("75")]).unwrap();
        session.select(&["75".parse().unwrap()], window(), &policy).unwrap();
        session.begin_fetch().unwrap();
        assert!(session.search_completed("solar", Vec::new()).is_err());
    }
}
