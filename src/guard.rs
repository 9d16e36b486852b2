//! Board level checks which gate every channel operation.
//!
//! The interlock must not be in its on (tripped) state and the board status must be zero. Both
//! are read once when a controller is opened, before any channel is touched. `BdCtr` is not part
//! of the gate: the firmware reports local control even while it is being driven remotely.

use log::{error, info};

use crate::{
    accessor::Accessor,
    error::{AccessViolation, Error, Result, StartupViolation},
    params::BoardParam,
    protocol::ReturnCode,
    session::Transport,
    types::{Reading, Scope},
};

/// Run the startup checks. Any violation is fatal.
pub fn check_board<T: Transport>(accessor: &mut Accessor<T>) -> Result<(), T::Error> {
    let interlock = BoardParam::BdIlk.name();
    let on_label = accessor
        .catalog()
        .lookup(Scope::Board, interlock)?
        .states
        .as_ref()
        .map(|labels| labels.on.clone())
        .ok_or_else(|| AccessViolation::NotOnOff {
            scope: Scope::Board,
            param: interlock.to_owned(),
        })?;

    match accessor.get_board(interlock)? {
        Reading::Int(0) => {}
        Reading::Int(_) => {
            error!("Board interlock has tripped ({on_label})");
            return Err(StartupViolation::InterlockTripped { state: on_label }.into());
        }
        Reading::Error(code) => return Err(unreadable(interlock, code)),
        Reading::Float(_) => return Err(Error::InvalidResponse),
    }

    let status = BoardParam::BdStatus.name();
    match accessor.get_board(status)? {
        Reading::Int(0) => {}
        Reading::Int(value) => {
            error!("Board failed with status {value:#x}");
            return Err(StartupViolation::BoardStatus(value).into());
        }
        Reading::Error(code) => return Err(unreadable(status, code)),
        Reading::Float(_) => return Err(Error::InvalidResponse),
    }

    info!("Board interlock and status are healthy");
    Ok(())
}

/// Read an on/off board parameter and translate it to its firmware label. `None` when the read
/// failed.
pub fn read_label<T: Transport>(
    accessor: &mut Accessor<T>,
    param: BoardParam,
) -> Result<Option<String>, T::Error> {
    let name = param.name();
    let labels = accessor
        .catalog()
        .lookup(Scope::Board, name)?
        .states
        .clone()
        .ok_or_else(|| AccessViolation::NotOnOff {
            scope: Scope::Board,
            param: name.to_owned(),
        })?;
    Ok(accessor
        .get_board(name)?
        .as_int()
        .map(|value| labels.label(value).to_owned()))
}

fn unreadable<I: embedded_io::Error>(param: &str, code: ReturnCode) -> Error<I> {
    error!("Board parameter {param} is unreadable, return code {code}");
    StartupViolation::Unreadable {
        param: param.to_owned(),
        code,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::Catalog,
        mock_controller::{MockController, MOCK_FAILURE},
    };

    fn accessor(controller: MockController) -> Accessor<MockController> {
        let mut controller = controller;
        let catalog = Catalog::discover(&mut controller, 0, 16).unwrap();
        controller.requests.clear();
        Accessor::new(controller, catalog, 0)
    }

    #[test]
    fn healthy_board_passes() {
        let mut accessor = accessor(MockController::r8033dm());
        check_board(&mut accessor).unwrap();
        assert_eq!(accessor.transport_mut().requests.len(), 2);
    }

    #[test]
    fn tripped_interlock_reports_its_label() {
        let mut controller = MockController::r8033dm();
        controller.set_board_value("BdIlk", 1.0);
        let mut accessor = accessor(controller);

        let result = check_board(&mut accessor);
        assert!(matches!(
            result,
            Err(Error::Startup(StartupViolation::InterlockTripped { state })) if state == "Tripped"
        ));
        // Board status is not even read.
        assert_eq!(accessor.transport_mut().requests.len(), 1);
    }

    #[test]
    fn non_zero_board_status_is_fatal() {
        let mut controller = MockController::r8033dm();
        controller.set_board_value("BdStatus", 0x4 as f64);
        let mut accessor = accessor(controller);

        let result = check_board(&mut accessor);
        assert!(matches!(
            result,
            Err(Error::Startup(StartupViolation::BoardStatus(0x4)))
        ));
    }

    #[test]
    fn interlock_must_be_on_off() {
        let mut controller = MockController::r8033dm();
        let ilk = controller.param_mut("BdIlk").unwrap();
        ilk.kind = 3;
        ilk.states = None;
        let mut accessor = accessor(controller);

        let result = check_board(&mut accessor);
        assert!(matches!(
            result,
            Err(Error::Access(AccessViolation::NotOnOff { .. }))
        ));
        assert!(accessor.transport_mut().requests.is_empty());
    }

    #[test]
    fn unreadable_interlock_is_fatal() {
        let mut controller = MockController::r8033dm();
        controller.fail_board_get("BdIlk");
        let mut accessor = accessor(controller);

        let result = check_board(&mut accessor);
        assert!(matches!(
            result,
            Err(Error::Startup(StartupViolation::Unreadable { param, code }))
                if param == "BdIlk" && code == ReturnCode(MOCK_FAILURE)
        ));
    }

    #[test]
    fn labels_follow_register_value() {
        let mut controller = MockController::r8033dm();
        controller.set_board_value("BdCtr", 1.0);
        let mut accessor = accessor(controller);

        assert_eq!(
            read_label(&mut accessor, BoardParam::BdCtr).unwrap(),
            Some("Local".to_owned())
        );
        assert_eq!(
            read_label(&mut accessor, BoardParam::BdIlk).unwrap(),
            Some("Ok".to_owned())
        );
        assert!(matches!(
            read_label(&mut accessor, BoardParam::BdStatus),
            Err(Error::Access(AccessViolation::NotOnOff { .. }))
        ));
    }
}
