pub mod mocker;

mod test_group;
